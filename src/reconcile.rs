use chrono::NaiveDate;

use crate::model::{FeeStatus, MonthStatus, Student};

/// Derive the aggregate fee state from the number of paid months.
///
/// 0 paid months => unpaid / 0. 12 paid months => paid / total. Anything in
/// between => partial with the proportional amount, rounded to the nearest
/// whole unit. The result never exceeds `total_amount`.
pub fn derive_fee_state(paid_months: usize, total_amount: i64) -> (FeeStatus, i64) {
    match paid_months {
        0 => (FeeStatus::Unpaid, 0),
        12 => (FeeStatus::Paid, total_amount),
        k => {
            let amount = ((k as f64 / 12.0) * total_amount as f64).round() as i64;
            (FeeStatus::Partial, amount)
        }
    }
}

/// Format a date the way the payment stamp is displayed, e.g. "May 3, 2026".
pub fn display_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

/// Toggle one month's flag and re-derive the aggregate state.
///
/// Marking a month paid stamps `lastPaymentDate` with `today`; un-marking
/// leaves the stamp alone, so the display never "rolls back". Returns false
/// (and changes nothing) when the month name is unknown.
pub fn apply_month_toggle(
    student: &mut Student,
    month: &str,
    status: MonthStatus,
    today: NaiveDate,
) -> bool {
    if !student.monthly_fee_status.set(month, status) {
        return false;
    }

    let (fee_status, paid_amount) =
        derive_fee_state(student.monthly_fee_status.paid_count(), student.total_amount);
    student.fee_status = fee_status;
    student.paid_amount = paid_amount;

    if status == MonthStatus::Paid {
        student.last_payment_date = Some(display_date(today));
    }
    true
}

/// Feed a ledger write through the month-count rule.
///
/// A signed amount converts into whole monthly shares (total / 12): a positive
/// credit marks that many of the earliest unpaid months, a negative one clears
/// that many of the latest paid months. The aggregate state is then re-derived,
/// so `paidAmount` stays a pure function of the month map. Amounts below one
/// share change no month. Returns the number of months that changed.
pub fn apply_payment_credit(student: &mut Student, amount: i64, stamp: &str) -> usize {
    if student.total_amount <= 0 {
        return 0;
    }
    let share = student.total_amount as f64 / 12.0;
    let months = (amount.unsigned_abs() as f64 / share).floor() as usize;

    let changed = if amount >= 0 {
        student.monthly_fee_status.mark_earliest_unpaid(months)
    } else {
        student.monthly_fee_status.unmark_latest_paid(months)
    };

    let (fee_status, paid_amount) =
        derive_fee_state(student.monthly_fee_status.paid_count(), student.total_amount);
    student.fee_status = fee_status;
    student.paid_amount = paid_amount;

    if amount > 0 && changed > 0 {
        student.last_payment_date = Some(stamp.to_string());
    }
    changed
}
