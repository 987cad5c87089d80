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

fn create_student(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> i64 {
    let res = request_ok(
        stdin,
        reader,
        "create-student",
        "students.create",
        json!({
            "name": "Farid Khan",
            "guardianName": "Salma Khan",
            "rollNumber": "6th-108",
            "className": "6th",
            "admissionDate": "2025-01-01",
            "totalAmount": 3000
        }),
    );
    res.get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_i64())
        .expect("student id")
}

fn fetch_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: i64,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "students.get",
        json!({ "studentId": student_id }),
    )
    .get("student")
    .cloned()
    .expect("student")
}

#[test]
fn successful_payment_credits_whole_months_through_the_same_rule() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    // 1500 on a 250/month share: six earliest months become paid.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "pay1",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": 1500,
            "date": "2026-04-10",
            "method": "upi",
            "status": "success"
        }),
    );
    let student = res.get("student").expect("student in result");
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("partial"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(1500));
    let months = student
        .get("monthlyFeeStatus")
        .and_then(|v| v.as_object())
        .expect("month map");
    assert_eq!(months.get("June").and_then(|v| v.as_str()), Some("paid"));
    assert_eq!(months.get("July").and_then(|v| v.as_str()), Some("unpaid"));
    // The stamp comes from the payment date, in display form.
    assert_eq!(
        student.get("lastPaymentDate").and_then(|v| v.as_str()),
        Some("Apr 10, 2026")
    );

    // Receipt numbers default from the roll number and payment id.
    let payment = res.get("payment").expect("payment in result");
    assert_eq!(
        payment.get("receiptNumber").and_then(|v| v.as_str()),
        Some("RCPT-6th-108-1")
    );
    assert_eq!(
        payment.get("description").and_then(|v| v.as_str()),
        Some("Fee payment for 6th class")
    );
}

#[test]
fn pending_and_failed_payments_record_without_crediting() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    for (i, status) in ["pending", "failed"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("pay{}", i),
            "payments.create",
            json!({
                "studentId": student_id,
                "amount": 1000,
                "date": "2026-03-01",
                "method": "cash",
                "status": status
            }),
        );
    }

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "bystudent",
        "payments.listByStudent",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        res.get("payments").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let student = fetch_student(&mut stdin, &mut reader, "check", student_id);
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn sub_share_amounts_mark_no_month() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "small",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": 200,
            "date": "2026-02-01",
            "method": "cash",
            "status": "success"
        }),
    );

    let student = fetch_student(&mut stdin, &mut reader, "check", student_id);
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn deleting_a_successful_payment_restores_the_prior_state() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": 1500,
            "date": "2026-04-10",
            "method": "card",
            "status": "success"
        }),
    );
    let payment_id = res
        .get("payment")
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_i64())
        .expect("payment id");

    request_ok(
        &mut stdin,
        &mut reader,
        "del",
        "payments.delete",
        json!({ "paymentId": payment_id }),
    );

    let student = fetch_student(&mut stdin, &mut reader, "check", student_id);
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("unpaid"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(0));
    let months = student
        .get("monthlyFeeStatus")
        .and_then(|v| v.as_object())
        .expect("month map");
    assert!(months.values().all(|v| v.as_str() == Some("unpaid")));

    let res = request_ok(&mut stdin, &mut reader, "list", "payments.list", json!({}));
    assert_eq!(
        res.get("payments").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn updating_a_payment_recredits_through_the_canonical_rule() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": 750,
            "date": "2026-04-10",
            "method": "cheque",
            "status": "success"
        }),
    );
    let mut payment = res.get("payment").cloned().expect("payment");

    let student = fetch_student(&mut stdin, &mut reader, "before", student_id);
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(750));

    payment["amount"] = json!(1500);
    request_ok(
        &mut stdin,
        &mut reader,
        "upd",
        "payments.update",
        json!({ "payment": payment }),
    );

    let student = fetch_student(&mut stdin, &mut reader, "after", student_id);
    assert_eq!(student.get("feeStatus").and_then(|v| v.as_str()), Some("partial"));
    assert_eq!(student.get("paidAmount").and_then(|v| v.as_i64()), Some(1500));
}

#[test]
fn stats_break_collections_down_by_month_and_method() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    // The stats window is the current calendar year.
    let current_year = {
        use chrono::Datelike;
        chrono::Local::now().year()
    };

    for (i, (amount, month, method)) in [
        (500i64, "01", "cash"),
        (750, "01", "upi"),
        (250, "03", "cash"),
    ]
    .iter()
    .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("pay{}", i),
            "payments.create",
            json!({
                "studentId": student_id,
                "amount": amount,
                "date": format!("{}-{}-15", current_year, month),
                "method": method,
                "status": "pending"
            }),
        );
    }

    let stats = request_ok(&mut stdin, &mut reader, "stats", "payments.stats", json!({}));
    assert_eq!(stats.get("totalCollected").and_then(|v| v.as_i64()), Some(1500));

    let monthly = stats
        .get("monthlyCollections")
        .and_then(|v| v.as_object())
        .expect("monthlyCollections");
    assert_eq!(monthly.len(), 12);
    assert_eq!(monthly.get("January").and_then(|v| v.as_i64()), Some(1250));
    assert_eq!(monthly.get("March").and_then(|v| v.as_i64()), Some(250));
    assert_eq!(monthly.get("February").and_then(|v| v.as_i64()), Some(0));

    let methods = stats
        .get("paymentMethods")
        .and_then(|v| v.as_object())
        .expect("paymentMethods");
    assert_eq!(methods.get("cash").and_then(|v| v.as_i64()), Some(750));
    assert_eq!(methods.get("upi").and_then(|v| v.as_i64()), Some(750));
    assert_eq!(methods.get("card").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn payments_reject_nonpositive_amounts_and_unknown_students() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let student_id = create_student(&mut stdin, &mut reader);

    let resp = request(
        &mut stdin,
        &mut reader,
        "neg",
        "payments.create",
        json!({
            "studentId": student_id,
            "amount": -100,
            "date": "2026-01-01",
            "method": "cash",
            "status": "success"
        }),
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
        "ghost",
        "payments.create",
        json!({
            "studentId": 9999,
            "amount": 100,
            "date": "2026-01-01",
            "method": "cash",
            "status": "success"
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );
}
