use anyhow::Result;
use chrono::Datelike;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::model::{FeeStatus, MonthStatus, NewStudent, PaymentMethod, PaymentStatus, MONTHS};
use crate::reconcile;
use crate::repo::Store;

/// Stock class ladder, youngest first.
pub const CLASS_LIST: [&str; 14] = [
    "Pre-Nursery",
    "Nursery",
    "Lower KG",
    "Upper KG",
    "1st",
    "2nd",
    "3rd",
    "4th",
    "5th",
    "6th",
    "7th",
    "8th",
    "9th",
    "10th",
];

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub classes: usize,
    pub students: usize,
    pub payments: usize,
    pub fee_types: usize,
    pub academic_years: usize,
}

/// Populate a demo dataset: the full class ladder, five students per class
/// with fee statuses cycling paid/partial/unpaid, matching ledger entries,
/// the stock fee catalog, and a two-year academic calendar.
///
/// Everything is deterministic: statuses and payment methods cycle by index,
/// so callers can assert exact figures.
pub fn seed_demo(store: &dyn Store, ledger: &Connection) -> Result<SeedSummary> {
    let classes = seed_classes(store)?;
    let (students, payments) = seed_students_and_payments(store, ledger)?;
    let fee_types = seed_fee_types(ledger)?;
    let academic_years = seed_academic_calendar(ledger)?;
    Ok(SeedSummary {
        classes,
        students,
        payments,
        fee_types,
        academic_years,
    })
}

fn seed_classes(store: &dyn Store) -> Result<usize> {
    for (i, name) in CLASS_LIST.iter().enumerate() {
        store.add_class(name, &format!("Teacher {}", i + 1))?;
    }
    Ok(CLASS_LIST.len())
}

fn seed_students_and_payments(store: &dyn Store, ledger: &Connection) -> Result<(usize, usize)> {
    let mut student_no = 0usize;
    let mut payment_no = 0usize;

    for class_name in CLASS_LIST.iter() {
        for i in 0..5 {
            student_no += 1;
            let roll_number = format!("{}-{}", class_name, 100 + i);
            let new = NewStudent {
                name: format!("Student {}-{}", student_no, class_name),
                guardian_name: format!("Guardian {}", student_no),
                roll_number: roll_number.clone(),
                class_name: class_name.to_string(),
                admission_date: "2025-01-01".to_string(),
                total_amount: 3000,
                address: Some(format!("{} Main Street, City", student_no)),
                phone: None,
                email: Some(format!("student{}@example.com", student_no)),
                gender: None,
                dob: None,
            };
            let mut student = store.add_student(&new)?;

            let paid_months = match i % 3 {
                0 => 12,
                1 => 6,
                _ => 0,
            };
            for month in MONTHS.iter().take(paid_months) {
                student.monthly_fee_status.set(month, MonthStatus::Paid);
            }
            let (fee_status, paid_amount) = reconcile::derive_fee_state(
                student.monthly_fee_status.paid_count(),
                student.total_amount,
            );
            student.fee_status = fee_status;
            student.paid_amount = paid_amount;
            if fee_status != FeeStatus::Unpaid {
                student.last_payment_date = Some("May 1, 2025".to_string());
            }
            store.update_student(&student)?;

            // Ledger entries that add up to the seeded paid amount. The
            // student rows above already carry the derived state, so these
            // are plain inserts with no crediting side effect.
            let installments: &[(i64, &str)] = match fee_status {
                FeeStatus::Paid => &[(1500, "2025-04-10"), (1500, "2025-05-01")],
                FeeStatus::Partial => &[(1500, "2025-04-10")],
                FeeStatus::Unpaid => &[],
            };
            for (amount, date) in installments {
                payment_no += 1;
                let method = PaymentMethod::all()[payment_no % 5];
                ledger.execute(
                    "INSERT INTO payments(
                       student_id, amount, date, method, description,
                       receipt_number, status, processed_by
                     ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        student.id,
                        amount,
                        date,
                        method.as_str(),
                        format!("Fee payment for {} class", class_name),
                        format!("RCPT-{}-{}", roll_number, payment_no),
                        PaymentStatus::Success.as_str(),
                        "Admin",
                    ],
                )?;
            }
        }
    }

    Ok((student_no, payment_no))
}

fn seed_fee_types(ledger: &Connection) -> Result<usize> {
    let all: Vec<&str> = CLASS_LIST.to_vec();
    let first_to_tenth: Vec<&str> = CLASS_LIST[4..].to_vec();
    let third_to_tenth: Vec<&str> = CLASS_LIST[6..].to_vec();

    let stock: [(&str, &str, i64, &str, &Vec<&str>, bool); 6] = [
        (
            "Tuition Fee",
            "Regular monthly academic fee",
            2000,
            "monthly",
            &all,
            false,
        ),
        (
            "Exam Fee",
            "Fee for term examinations",
            1500,
            "annual",
            &first_to_tenth,
            false,
        ),
        (
            "Computer Fee",
            "Computer lab access and training",
            500,
            "monthly",
            &third_to_tenth,
            false,
        ),
        (
            "Development Fee",
            "School infrastructure development",
            3000,
            "annual",
            &all,
            false,
        ),
        (
            "Transport Fee",
            "School bus transportation service",
            1200,
            "monthly",
            &all,
            true,
        ),
        (
            "Library Fee",
            "Library resources and maintenance",
            800,
            "annual",
            &first_to_tenth,
            false,
        ),
    ];

    for (name, description, amount, frequency, applicable, is_optional) in stock.iter() {
        ledger.execute(
            "INSERT INTO fee_types(
               name, description, amount, frequency, applicable, is_optional, applied_date
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            params![
                name,
                description,
                amount,
                frequency,
                serde_json::to_string(applicable)?,
                *is_optional as i64,
                "2025-01-01",
            ],
        )?;
    }
    Ok(stock.len())
}

fn seed_academic_calendar(ledger: &Connection) -> Result<usize> {
    let year = chrono::Local::now().year();
    let exam_classes = serde_json::to_string(&CLASS_LIST[4..].to_vec())?;

    for (offset, active) in [(0, true), (1, false)] {
        let y = year + offset;
        ledger.execute(
            "INSERT INTO academic_years(name, start_date, end_date, is_active)
             VALUES(?, ?, ?, ?)",
            params![
                format!("{}-{}", y, y + 1),
                format!("{}-04-01", y),
                format!("{}-03-31", y + 1),
                active as i64,
            ],
        )?;
        let year_id = ledger.last_insert_rowid();

        let terms: [(&str, String, String, String); 3] = [
            (
                "Term 1",
                format!("{}-04-01", y),
                format!("{}-08-31", y),
                format!("{}-04-15", y),
            ),
            (
                "Term 2",
                format!("{}-09-01", y),
                format!("{}-01-31", y + 1),
                format!("{}-09-15", y),
            ),
            (
                "Term 3",
                format!("{}-02-01", y + 1),
                format!("{}-03-31", y + 1),
                format!("{}-02-15", y + 1),
            ),
        ];
        let exams: [(&str, String, String); 3] = [
            (
                "Mid-Term Examination",
                format!("{}-06-15", y),
                format!("{}-06-25", y),
            ),
            (
                "Half-Yearly Examination",
                format!("{}-10-15", y),
                format!("{}-10-25", y),
            ),
            (
                "Annual Examination",
                format!("{}-03-01", y + 1),
                format!("{}-03-15", y + 1),
            ),
        ];

        for (i, (name, start, end, deadline)) in terms.iter().enumerate() {
            let term_id = format!("{}-{}", year_id, i + 1);
            ledger.execute(
                "INSERT INTO terms(
                   id, academic_year_id, name, start_date, end_date, fee_deadline, sort_order
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)",
                params![term_id, year_id, name, start, end, deadline, i as i64],
            )?;

            // Only the active year carries scheduled exams.
            if active {
                let (exam_name, exam_start, exam_end) = &exams[i];
                ledger.execute(
                    "INSERT INTO exams(
                       id, term_id, name, start_date, end_date, classes, sort_order
                     ) VALUES(?, ?, ?, ?, ?, ?, 0)",
                    params![
                        format!("{}-1", term_id),
                        term_id,
                        exam_name,
                        exam_start,
                        exam_end,
                        exam_classes,
                    ],
                )?;
            }
        }
    }

    Ok(2)
}
