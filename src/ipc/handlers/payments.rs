use chrono::Datelike;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{get_i64, parse_date};
use crate::ipc::types::{AppState, Request};
use crate::model::{NewPayment, Payment, PaymentMethod, PaymentStatus, MONTHS};
use crate::reconcile;

const PAYMENT_COLUMNS: &str = "id, student_id, amount, date, method, description,
     receipt_number, status, processed_by";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    let method: String = row.get(4)?;
    let status: String = row.get(7)?;
    Ok(Payment {
        id: row.get(0)?,
        student_id: row.get(1)?,
        amount: row.get(2)?,
        date: row.get(3)?,
        method: PaymentMethod::parse(&method).unwrap_or(PaymentMethod::Cash),
        description: row.get(5)?,
        receipt_number: row.get(6)?,
        status: PaymentStatus::parse(&status).unwrap_or(PaymentStatus::Pending),
        processed_by: row.get(8)?,
    })
}

fn fetch_payment(state: &AppState, id: i64) -> anyhow::Result<Option<Payment>> {
    let payment = state
        .ledger
        .query_row(
            &format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS),
            [id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

/// Payment dates are stored ISO; the student stamp uses the display form.
fn payment_stamp(date: &str) -> String {
    match parse_date(date) {
        Some(d) => reconcile::display_date(d),
        None => date.to_string(),
    }
}

/// Apply a signed ledger credit to the referenced student through the
/// month-count rule. A missing student is ignored: the two stores carry no
/// atomicity guarantee and the ledger row stands on its own.
fn credit_student(
    state: &mut AppState,
    student_id: i64,
    amount: i64,
    stamp: &str,
) -> anyhow::Result<()> {
    let Some(mut student) = state.store.get_student(student_id)? else {
        return Ok(());
    };
    reconcile::apply_payment_credit(&mut student, amount, stamp);
    state.store.update_student(&student)?;
    Ok(())
}

fn handle_payments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut stmt = match state
        .ledger
        .prepare(&format!("SELECT {} FROM payments ORDER BY id", PAYMENT_COLUMNS))
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], payment_from_row)
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>());
    match rows {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(payment_id) = get_i64(&req.params, "paymentId") else {
        return err(&req.id, "bad_params", "missing paymentId", None);
    };
    match fetch_payment(state, payment_id) {
        Ok(Some(payment)) => ok(&req.id, json!({ "payment": payment })),
        Ok(None) => err(&req.id, "not_found", "payment not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_list_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(student_id) = get_i64(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let mut stmt = match state.ledger.prepare(&format!(
        "SELECT {} FROM payments WHERE student_id = ? ORDER BY id",
        PAYMENT_COLUMNS
    )) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([student_id], payment_from_row)
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>());
    match rows {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let new: NewPayment = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if new.amount <= 0 {
        return err(&req.id, "bad_params", "amount must be positive", None);
    }

    let student = match state.store.get_student(new.student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return store_err(&req.id, "payments.create", e),
    };

    let description = new
        .description
        .clone()
        .unwrap_or_else(|| format!("Fee payment for {} class", student.class_name));
    let processed_by = new.processed_by.clone().unwrap_or_else(|| "Admin".to_string());

    if let Err(e) = state.ledger.execute(
        "INSERT INTO payments(
           student_id, amount, date, method, description,
           receipt_number, status, processed_by
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            new.student_id,
            new.amount,
            new.date,
            new.method.as_str(),
            description,
            new.receipt_number.clone().unwrap_or_default(),
            new.status.as_str(),
            processed_by,
        ],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    let payment_id = state.ledger.last_insert_rowid();

    if new.receipt_number.is_none() {
        let receipt = format!("RCPT-{}-{}", student.roll_number, payment_id);
        if let Err(e) = state.ledger.execute(
            "UPDATE payments SET receipt_number = ? WHERE id = ?",
            params![receipt, payment_id],
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    // Only settled money moves the student's fee state.
    if new.status == PaymentStatus::Success {
        let stamp = payment_stamp(&new.date);
        if let Err(e) = credit_student(state, new.student_id, new.amount, &stamp) {
            return store_err(&req.id, "payments.create", e);
        }
    }

    let payment = match fetch_payment(state, payment_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "payment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let student = match state.store.get_student(new.student_id) {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, "payments.create", e),
    };
    ok(&req.id, json!({ "payment": payment, "student": student }))
}

fn handle_payments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("payment") else {
        return err(&req.id, "bad_params", "missing payment", None);
    };
    let payment: Payment = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if payment.amount <= 0 {
        return err(&req.id, "bad_params", "amount must be positive", None);
    }

    let old = match fetch_payment(state, payment.id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "payment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Err(e) = state.ledger.execute(
        "UPDATE payments SET
           student_id = ?, amount = ?, date = ?, method = ?, description = ?,
           receipt_number = ?, status = ?, processed_by = ?
         WHERE id = ?",
        params![
            payment.student_id,
            payment.amount,
            payment.date,
            payment.method.as_str(),
            payment.description,
            payment.receipt_number,
            payment.status.as_str(),
            payment.processed_by,
            payment.id,
        ],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    // Re-credit through the canonical rule: undo what the old record
    // contributed, then apply the new one. Both legs are skipped for
    // pending/failed records.
    if old.status == PaymentStatus::Success {
        let stamp = payment_stamp(&old.date);
        if let Err(e) = credit_student(state, old.student_id, -old.amount, &stamp) {
            return store_err(&req.id, "payments.update", e);
        }
    }
    if payment.status == PaymentStatus::Success {
        let stamp = payment_stamp(&payment.date);
        if let Err(e) = credit_student(state, payment.student_id, payment.amount, &stamp) {
            return store_err(&req.id, "payments.update", e);
        }
    }

    ok(&req.id, json!({ "payment": payment }))
}

fn handle_payments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(payment_id) = get_i64(&req.params, "paymentId") else {
        return err(&req.id, "bad_params", "missing paymentId", None);
    };
    let payment = match fetch_payment(state, payment_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "payment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Err(e) = state
        .ledger
        .execute("DELETE FROM payments WHERE id = ?", [payment_id])
    {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }

    if payment.status == PaymentStatus::Success {
        let stamp = payment_stamp(&payment.date);
        if let Err(e) = credit_student(state, payment.student_id, -payment.amount, &stamp) {
            return store_err(&req.id, "payments.delete", e);
        }
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_payments_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut stmt = match state
        .ledger
        .prepare(&format!("SELECT {} FROM payments", PAYMENT_COLUMNS))
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let payments = match stmt
        .query_map([], payment_from_row)
        .and_then(|it| it.collect::<rusqlite::Result<Vec<_>>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let total_collected: i64 = payments.iter().map(|p| p.amount).sum();

    let current_year = chrono::Local::now().year();
    let mut monthly = serde_json::Map::new();
    for month in MONTHS.iter() {
        monthly.insert(month.to_string(), json!(0));
    }
    for payment in &payments {
        let Some(date) = parse_date(&payment.date) else {
            continue;
        };
        if date.year() != current_year {
            continue;
        }
        let month = MONTHS[date.month0() as usize];
        let slot = monthly.entry(month.to_string()).or_insert(json!(0));
        let collected = slot.as_i64().unwrap_or(0);
        *slot = json!(collected + payment.amount);
    }

    let mut methods = serde_json::Map::new();
    for method in PaymentMethod::all() {
        let sum: i64 = payments
            .iter()
            .filter(|p| p.method == method)
            .map(|p| p.amount)
            .sum();
        methods.insert(method.as_str().to_string(), json!(sum));
    }

    ok(
        &req.id,
        json!({
            "totalCollected": total_collected,
            "monthlyCollections": monthly,
            "paymentMethods": methods
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.list" => Some(handle_payments_list(state, req)),
        "payments.get" => Some(handle_payments_get(state, req)),
        "payments.listByStudent" => Some(handle_payments_list_by_student(state, req)),
        "payments.create" => Some(handle_payments_create(state, req)),
        "payments.update" => Some(handle_payments_update(state, req)),
        "payments.delete" => Some(handle_payments_delete(state, req)),
        "payments.stats" => Some(handle_payments_stats(state, req)),
        _ => None,
    }
}
