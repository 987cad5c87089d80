use rusqlite::Connection;

/// Open the roster store (students, classes, fee structure).
///
/// The store is in-memory: data lives for the process lifetime and every run
/// starts clean. `store.reset` wipes the tables without reopening.
pub fn open_roster_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            guardian_name TEXT NOT NULL,
            roll_number TEXT NOT NULL,
            class_name TEXT NOT NULL,
            admission_date TEXT NOT NULL,
            fee_status TEXT NOT NULL,
            paid_amount INTEGER NOT NULL,
            total_amount INTEGER NOT NULL,
            last_payment_date TEXT,
            monthly_fee_status TEXT NOT NULL,
            address TEXT,
            phone TEXT,
            email TEXT,
            gender TEXT,
            dob TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            teacher TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structure(
            class TEXT PRIMARY KEY,
            monthly_fee INTEGER NOT NULL,
            admission_fee INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Open the ledger store (payments, fee catalog, academic calendar). These
/// tables are local-only: the remote backend never mirrors them.
pub fn open_ledger_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            date TEXT NOT NULL,
            method TEXT NOT NULL,
            description TEXT NOT NULL,
            receipt_number TEXT NOT NULL,
            status TEXT NOT NULL,
            processed_by TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_types(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            amount INTEGER NOT NULL,
            frequency TEXT NOT NULL,
            applicable TEXT NOT NULL,
            is_optional INTEGER NOT NULL,
            applied_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_active INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            academic_year_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            fee_deadline TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_year ON terms(academic_year_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            term_id TEXT NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            classes TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(term_id) REFERENCES terms(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_exams_term ON exams(term_id)", [])?;

    Ok(conn)
}

/// Wipe every ledger table. Part of the `store.reset` test hook.
pub fn reset_ledger(conn: &Connection) -> anyhow::Result<()> {
    for table in ["payments", "fee_types", "exams", "terms", "academic_years"] {
        conn.execute(&format!("DELETE FROM {}", table), [])?;
    }
    let _ = conn.execute(
        "DELETE FROM sqlite_sequence WHERE name IN ('payments', 'fee_types', 'academic_years')",
        [],
    );
    Ok(())
}
