use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{get_i64, get_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{FeeStatus, MonthStatus, MonthlyFees, NewStudent, Student};
use crate::reconcile;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.store.list_students() {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => store_err(&req.id, "students.list", e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(student_id) = get_i64(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match state.store.get_student(student_id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => store_err(&req.id, "students.get", e),
    }
}

fn handle_students_list_by_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_name) = get_str(&req.params, "className") else {
        return err(&req.id, "bad_params", "missing className", None);
    };
    match state.store.list_students() {
        Ok(students) => {
            let students: Vec<Student> = students
                .into_iter()
                .filter(|s| s.class_name == class_name)
                .collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => store_err(&req.id, "students.listByClass", e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut new: NewStudent = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    new.name = new.name.trim().to_string();
    new.guardian_name = new.guardian_name.trim().to_string();
    new.roll_number = new.roll_number.trim().to_string();
    new.class_name = new.class_name.trim().to_string();
    if new.name.is_empty() || new.class_name.is_empty() {
        return err(&req.id, "bad_params", "name/className must not be empty", None);
    }

    match state.store.add_student(&new) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => store_err(&req.id, "students.create", e),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing student", None);
    };
    let mut student: Student = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    // Wholesale replace, but the aggregate state is never trusted from the
    // caller: re-derive it from the submitted month map so the stored record
    // always satisfies the derivation invariant.
    let (fee_status, paid_amount) =
        reconcile::derive_fee_state(student.monthly_fee_status.paid_count(), student.total_amount);
    student.fee_status = fee_status;
    student.paid_amount = paid_amount;

    match state.store.update_student(&student) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => store_err(&req.id, "students.update", e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(student_id) = get_i64(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match state.store.delete_student(student_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "student not found", None),
        Err(e) => store_err(&req.id, "students.delete", e),
    }
}

/// The interactive reconciliation entry point: flip one month's flag and let
/// the month-count rule re-derive the aggregate state.
fn handle_students_set_month_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(student_id) = get_i64(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(month) = get_str(&req.params, "month") else {
        return err(&req.id, "bad_params", "missing month", None);
    };
    if MonthlyFees::month_index(month).is_none() {
        return err(
            &req.id,
            "bad_params",
            format!("unknown month: {}", month),
            None,
        );
    }
    let status = match get_str(&req.params, "status").and_then(MonthStatus::parse) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "status must be paid or unpaid", None),
    };

    let mut student = match state.store.get_student(student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return store_err(&req.id, "students.setMonthStatus", e),
    };

    let today = chrono::Local::now().date_naive();
    reconcile::apply_month_toggle(&mut student, month, status, today);

    match state.store.update_student(&student) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => store_err(&req.id, "students.setMonthStatus", e),
    }
}

fn handle_students_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let students = match state.store.list_students() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "students.stats", e),
    };

    let total_students = students.len();
    let paid = students
        .iter()
        .filter(|s| s.fee_status == FeeStatus::Paid)
        .count();
    let partial = students
        .iter()
        .filter(|s| s.fee_status == FeeStatus::Partial)
        .count();
    let unpaid = students
        .iter()
        .filter(|s| s.fee_status == FeeStatus::Unpaid)
        .count();
    let total_fees: i64 = students.iter().map(|s| s.total_amount).sum();
    let collected_fees: i64 = students.iter().map(|s| s.paid_amount).sum();

    ok(
        &req.id,
        json!({
            "totalStudents": total_students,
            "paidStudents": paid,
            "partialStudents": partial,
            "unpaidStudents": unpaid,
            "totalFees": total_fees,
            "collectedFees": collected_fees,
            "pendingFees": total_fees - collected_fees
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.listByClass" => Some(handle_students_list_by_class(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.setMonthStatus" => Some(handle_students_set_month_status(state, req)),
        "students.stats" => Some(handle_students_stats(state, req)),
        _ => None,
    }
}
