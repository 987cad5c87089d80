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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> serde_json::Value {
    let res = request_ok(
        stdin,
        reader,
        "create",
        "students.create",
        json!({
            "name": "Asha Verma",
            "guardianName": "Ravi Verma",
            "rollNumber": "5th-101",
            "className": "5th",
            "admissionDate": "2025-01-01",
            "totalAmount": 3000
        }),
    );
    res.get("student").cloned().expect("student in result")
}

#[test]
fn month_toggles_track_partial_paid_unpaid_bands() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student = create_student(&mut stdin, &mut reader);
    let student_id = student.get("id").and_then(|v| v.as_i64()).expect("id");

    // Six paid months on a 3000 total is the canonical partial case.
    let mut last = json!(null);
    for (i, month) in ["January", "February", "March", "April", "May", "June"]
        .iter()
        .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "students.setMonthStatus",
            json!({ "studentId": student_id, "month": month, "status": "paid" }),
        );
        last = res.get("student").cloned().expect("student");
    }
    assert_eq!(last.get("feeStatus").and_then(|v| v.as_str()), Some("partial"));
    assert_eq!(last.get("paidAmount").and_then(|v| v.as_i64()), Some(1500));

    // The rest of the year takes the student to fully paid.
    for (i, month) in [
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ]
    .iter()
    .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m2{}", i),
            "students.setMonthStatus",
            json!({ "studentId": student_id, "month": month, "status": "paid" }),
        );
        last = res.get("student").cloned().expect("student");
    }
    assert_eq!(last.get("feeStatus").and_then(|v| v.as_str()), Some("paid"));
    assert_eq!(last.get("paidAmount").and_then(|v| v.as_i64()), Some(3000));

    // Un-marking every month walks back down to unpaid/0.
    for (i, month) in [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ]
    .iter()
    .enumerate()
    {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m3{}", i),
            "students.setMonthStatus",
            json!({ "studentId": student_id, "month": month, "status": "unpaid" }),
        );
        last = res.get("student").cloned().expect("student");
    }
    assert_eq!(last.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    assert_eq!(last.get("paidAmount").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn paid_toggle_stamps_last_payment_and_unpaid_keeps_it() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student = create_student(&mut stdin, &mut reader);
    let student_id = student.get("id").and_then(|v| v.as_i64()).expect("id");
    assert!(student.get("lastPaymentDate").is_none());

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "students.setMonthStatus",
        json!({ "studentId": student_id, "month": "March", "status": "paid" }),
    );
    let stamped = res
        .get("student")
        .and_then(|s| s.get("lastPaymentDate"))
        .and_then(|v| v.as_str())
        .expect("lastPaymentDate set after paid toggle")
        .to_string();
    assert!(!stamped.is_empty());

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "unpay",
        "students.setMonthStatus",
        json!({ "studentId": student_id, "month": "March", "status": "unpaid" }),
    );
    let student = res.get("student").expect("student");
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    // The stamp is a display nicety, not a ledger: it survives the un-mark.
    assert_eq!(
        student.get("lastPaymentDate").and_then(|v| v.as_str()),
        Some(stamped.as_str())
    );
}

#[test]
fn unknown_month_and_bad_status_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student = create_student(&mut stdin, &mut reader);
    let student_id = student.get("id").and_then(|v| v.as_i64()).expect("id");

    let resp = request(
        &mut stdin,
        &mut reader,
        "badmonth",
        "students.setMonthStatus",
        json!({ "studentId": student_id, "month": "Brumaire", "status": "paid" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "badstatus",
        "students.setMonthStatus",
        json!({ "studentId": student_id, "month": "March", "status": "overdue" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    // Nothing about the student changed.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "check",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let student = res.get("student").expect("student");
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(0));
}
