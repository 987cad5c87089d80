use serde_json::json;

use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{get_i64, get_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassInfo, ClassRecord, Student};

/// Rollups are derived on read by summing over the live student list; nothing
/// stores a counter.
fn class_info(record: &ClassRecord, students: &[Student]) -> ClassInfo {
    let members: Vec<&Student> = students
        .iter()
        .filter(|s| s.class_name == record.name)
        .collect();
    ClassInfo {
        id: record.id,
        name: record.name.clone(),
        teacher: record.teacher.clone(),
        students_count: members.len(),
        total_fees: members.iter().map(|s| s.total_amount).sum(),
        collected_fees: members.iter().map(|s| s.paid_amount).sum(),
    }
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let records = match state.store.list_classes() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "classes.list", e),
    };
    let students = match state.store.list_students() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "classes.list", e),
    };
    let classes: Vec<ClassInfo> = records.iter().map(|r| class_info(r, &students)).collect();
    ok(&req.id, json!({ "classes": classes }))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_id) = get_i64(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let record = match state.store.get_class(class_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return store_err(&req.id, "classes.get", e),
    };
    let students = match state.store.list_students() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "classes.get", e),
    };
    ok(&req.id, json!({ "class": class_info(&record, &students) }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match get_str(&req.params, "name") {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let teacher = get_str(&req.params, "teacher").unwrap_or("").trim().to_string();

    match state.store.add_class(&name, &teacher) {
        Ok(record) => ok(&req.id, json!({ "class": record })),
        Err(e) => store_err(&req.id, "classes.create", e),
    }
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_id) = get_i64(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let mut record = match state.store.get_class(class_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return store_err(&req.id, "classes.update", e),
    };

    let old_name = record.name.clone();
    if let Some(name) = get_str(&req.params, "name") {
        let name = name.trim();
        if name.is_empty() {
            return err(&req.id, "bad_params", "name must not be empty", None);
        }
        record.name = name.to_string();
    }
    if let Some(teacher) = get_str(&req.params, "teacher") {
        record.teacher = teacher.trim().to_string();
    }

    // A rename has to carry the class's students along, or every record that
    // referenced the old name would silently fall out of the rollups.
    if record.name != old_name {
        let students = match state.store.list_students() {
            Ok(v) => v,
            Err(e) => return store_err(&req.id, "classes.update", e),
        };
        for mut student in students.into_iter().filter(|s| s.class_name == old_name) {
            student.class_name = record.name.clone();
            if let Err(e) = state.store.update_student(&student) {
                return store_err(&req.id, "classes.update", e);
            }
        }
    }

    match state.store.update_class(&record) {
        Ok(Some(record)) => ok(&req.id, json!({ "class": record })),
        Ok(None) => err(&req.id, "not_found", "class not found", None),
        Err(e) => store_err(&req.id, "classes.update", e),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(class_id) = get_i64(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let record = match state.store.get_class(class_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return store_err(&req.id, "classes.delete", e),
    };

    let students = match state.store.list_students() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "classes.delete", e),
    };
    let assigned = students
        .iter()
        .filter(|s| s.class_name == record.name)
        .count();
    if assigned > 0 {
        return err(
            &req.id,
            "class_in_use",
            format!("{} students are assigned to this class", assigned),
            Some(json!({ "studentsCount": assigned })),
        );
    }

    match state.store.delete_class(class_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "class not found", None),
        Err(e) => store_err(&req.id, "classes.delete", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
