use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_feebookd");
    let mut child = Command::new(exe)
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_ANON_KEY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn feebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn class_by_name(classes: &serde_json::Value, name: &str) -> serde_json::Value {
    classes
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes array")
        .iter()
        .find(|c| c.get("name").and_then(|v| v.as_str()) == Some(name))
        .cloned()
        .unwrap_or_else(|| panic!("class {} missing", name))
}

fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    class_name: &str,
    total_amount: i64,
) -> i64 {
    let res = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({
            "name": name,
            "guardianName": format!("Guardian of {}", name),
            "rollNumber": format!("{}-{}", class_name, id),
            "className": class_name,
            "admissionDate": "2025-01-01",
            "totalAmount": total_amount
        }),
    );
    res.get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("id")
}

#[test]
fn rollups_follow_student_adds_moves_and_deletes() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "classes.create",
        json!({ "name": "4th", "teacher": "Teacher 4" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "c2",
        "classes.create",
        json!({ "name": "5th", "teacher": "Teacher 5" }),
    );

    let a = add_student(&mut stdin, &mut reader, "s1", "Asha", "4th", 3000);
    let b = add_student(&mut stdin, &mut reader, "s2", "Bina", "4th", 3000);
    add_student(&mut stdin, &mut reader, "s3", "Chand", "5th", 2400);

    // Six paid months on one 4th-grader: collected shows up in that rollup.
    for (i, month) in ["January", "February", "March", "April", "May", "June"]
        .iter()
        .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "students.setMonthStatus",
            json!({ "studentId": a, "month": month, "status": "paid" }),
        );
    }

    let classes = request_ok(&mut stdin, &mut reader, "l1", "classes.list", json!({}));
    let fourth = class_by_name(&classes, "4th");
    assert_eq!(fourth.get("studentsCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(fourth.get("totalFees").and_then(|v| v.as_i64()), Some(6000));
    assert_eq!(fourth.get("collectedFees").and_then(|v| v.as_i64()), Some(1500));
    let fifth = class_by_name(&classes, "5th");
    assert_eq!(fifth.get("studentsCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(fifth.get("totalFees").and_then(|v| v.as_i64()), Some(2400));

    // Moving a student between classes moves their share of the rollups.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "getb",
        "students.get",
        json!({ "studentId": b }),
    );
    let mut student = res.get("student").cloned().expect("student");
    student["className"] = json!("5th");
    request_ok(
        &mut stdin,
        &mut reader,
        "move",
        "students.update",
        json!({ "student": student }),
    );

    let classes = request_ok(&mut stdin, &mut reader, "l2", "classes.list", json!({}));
    let fourth = class_by_name(&classes, "4th");
    assert_eq!(fourth.get("studentsCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(fourth.get("totalFees").and_then(|v| v.as_i64()), Some(3000));
    let fifth = class_by_name(&classes, "5th");
    assert_eq!(fifth.get("studentsCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(fifth.get("totalFees").and_then(|v| v.as_i64()), Some(5400));

    // Deleting drops exactly the student's stored amounts from the rollup.
    request_ok(
        &mut stdin,
        &mut reader,
        "dela",
        "students.delete",
        json!({ "studentId": a }),
    );
    let classes = request_ok(&mut stdin, &mut reader, "l3", "classes.list", json!({}));
    let fourth = class_by_name(&classes, "4th");
    assert_eq!(fourth.get("studentsCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(fourth.get("totalFees").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(fourth.get("collectedFees").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn class_rename_carries_students_along() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "classes.create",
        json!({ "name": "Lower KG", "teacher": "Teacher 3" }),
    );
    let class_id = res
        .get("class")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_i64())
        .expect("class id");
    let student_id = add_student(&mut stdin, &mut reader, "s1", "Dev", "Lower KG", 3000);

    request_ok(
        &mut stdin,
        &mut reader,
        "rename",
        "classes.update",
        json!({ "classId": class_id, "name": "Junior KG" }),
    );

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        res.get("student")
            .and_then(|s| s.get("className"))
            .and_then(|v| v.as_str()),
        Some("Junior KG")
    );

    let classes = request_ok(&mut stdin, &mut reader, "list", "classes.list", json!({}));
    let renamed = class_by_name(&classes, "Junior KG");
    assert_eq!(renamed.get("studentsCount").and_then(|v| v.as_i64()), Some(1));
}

#[test]
fn class_with_students_refuses_deletion() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "classes.create",
        json!({ "name": "9th", "teacher": "Teacher 13" }),
    );
    let class_id = res
        .get("class")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_i64())
        .expect("class id");
    let student_id = add_student(&mut stdin, &mut reader, "s1", "Esha", "9th", 3000);

    let resp = request(
        &mut stdin,
        &mut reader,
        "del",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("class_in_use")
    );

    // Once the roster is empty the class can go.
    request_ok(
        &mut stdin,
        &mut reader,
        "dels",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "del2",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    let classes = request_ok(&mut stdin, &mut reader, "list", "classes.list", json!({}));
    assert!(classes
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes array")
        .is_empty());
}
