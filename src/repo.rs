use anyhow::Result;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db;
use crate::model::{ClassRecord, FeeStatus, MonthlyFees, NewStudent, Student};
use crate::remote::RemoteStore;

/// The single repository interface over student and class records.
///
/// Two implementations exist: the in-memory [`LocalStore`] and the hosted
/// [`RemoteStore`]. Which one serves a session is decided once, at startup —
/// never re-probed per call. Reconciliation always runs in the daemon; a
/// backend only persists what the canonical rule derived.
pub trait Store {
    fn list_students(&self) -> Result<Vec<Student>>;
    fn get_student(&self, id: i64) -> Result<Option<Student>>;
    fn add_student(&self, new: &NewStudent) -> Result<Student>;
    /// Wholesale replace. Returns None when no such student exists.
    fn update_student(&self, student: &Student) -> Result<Option<Student>>;
    fn delete_student(&self, id: i64) -> Result<bool>;

    fn list_classes(&self) -> Result<Vec<ClassRecord>>;
    fn get_class(&self, id: i64) -> Result<Option<ClassRecord>>;
    fn add_class(&self, name: &str, teacher: &str) -> Result<ClassRecord>;
    fn update_class(&self, record: &ClassRecord) -> Result<Option<ClassRecord>>;
    fn delete_class(&self, id: i64) -> Result<bool>;

    fn upsert_fee_structure(&self, class: &str, monthly_fee: i64, admission_fee: i64)
        -> Result<()>;

    /// Test hook: wipe everything. Refused by the remote backend.
    fn reset(&self) -> Result<()>;
}

pub struct SelectedStore {
    pub store: Box<dyn Store>,
    pub backend: &'static str,
    pub remote_connected: bool,
}

/// Pick the backend for this session. Remote wins only when credentials are
/// present and the connectivity probe succeeds; anything else degrades to the
/// in-memory store with a logged warning.
pub fn select_store() -> Result<SelectedStore> {
    match RemoteStore::from_env() {
        Some(remote) => {
            if remote.probe() {
                info!("remote backend selected ({})", remote.base_url());
                Ok(SelectedStore {
                    store: Box::new(remote),
                    backend: "remote",
                    remote_connected: true,
                })
            } else {
                warn!("remote store probe failed; using the in-memory store");
                Ok(local_store()?)
            }
        }
        None => {
            warn!("SUPABASE_URL/SUPABASE_ANON_KEY not set; using the in-memory store");
            Ok(local_store()?)
        }
    }
}

fn local_store() -> Result<SelectedStore> {
    Ok(SelectedStore {
        store: Box::new(LocalStore::open()?),
        backend: "local",
        remote_connected: false,
    })
}

/// In-memory SQLite implementation of [`Store`].
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub fn open() -> Result<Self> {
        Ok(Self {
            conn: db::open_roster_db()?,
        })
    }
}

const STUDENT_COLUMNS: &str = "id, name, guardian_name, roll_number, class_name, admission_date,
     fee_status, paid_amount, total_amount, last_payment_date, monthly_fee_status,
     address, phone, email, gender, dob";

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    let fee_status: String = row.get(6)?;
    let monthly: String = row.get(10)?;
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        guardian_name: row.get(2)?,
        roll_number: row.get(3)?,
        class_name: row.get(4)?,
        admission_date: row.get(5)?,
        fee_status: FeeStatus::parse(&fee_status).unwrap_or(FeeStatus::Unpaid),
        paid_amount: row.get(7)?,
        total_amount: row.get(8)?,
        last_payment_date: row.get(9)?,
        monthly_fee_status: serde_json::from_str(&monthly).unwrap_or_default(),
        address: row.get(11)?,
        phone: row.get(12)?,
        email: row.get(13)?,
        gender: row.get(14)?,
        dob: row.get(15)?,
    })
}

fn class_from_row(row: &Row) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        teacher: row.get(2)?,
    })
}

impl Store for LocalStore {
    fn list_students(&self) -> Result<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM students ORDER BY id", STUDENT_COLUMNS))?;
        let students = stmt
            .query_map([], student_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }

    fn get_student(&self, id: i64) -> Result<Option<Student>> {
        let student = self
            .conn
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
                [id],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn add_student(&self, new: &NewStudent) -> Result<Student> {
        let monthly = MonthlyFees::all_unpaid();
        let monthly_json = serde_json::to_string(&monthly)?;
        self.conn.execute(
            "INSERT INTO students(
               name, guardian_name, roll_number, class_name, admission_date,
               fee_status, paid_amount, total_amount, last_payment_date,
               monthly_fee_status, address, phone, email, gender, dob
             ) VALUES(?, ?, ?, ?, ?, ?, 0, ?, NULL, ?, ?, ?, ?, ?, ?)",
            params![
                new.name,
                new.guardian_name,
                new.roll_number,
                new.class_name,
                new.admission_date,
                FeeStatus::Unpaid.as_str(),
                new.total_amount,
                monthly_json,
                new.address,
                new.phone,
                new.email,
                new.gender,
                new.dob,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Student {
            id,
            name: new.name.clone(),
            guardian_name: new.guardian_name.clone(),
            roll_number: new.roll_number.clone(),
            class_name: new.class_name.clone(),
            admission_date: new.admission_date.clone(),
            fee_status: FeeStatus::Unpaid,
            paid_amount: 0,
            total_amount: new.total_amount,
            last_payment_date: None,
            monthly_fee_status: monthly,
            address: new.address.clone(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            gender: new.gender.clone(),
            dob: new.dob.clone(),
        })
    }

    fn update_student(&self, student: &Student) -> Result<Option<Student>> {
        let monthly_json = serde_json::to_string(&student.monthly_fee_status)?;
        let changed = self.conn.execute(
            "UPDATE students SET
               name = ?, guardian_name = ?, roll_number = ?, class_name = ?,
               admission_date = ?, fee_status = ?, paid_amount = ?, total_amount = ?,
               last_payment_date = ?, monthly_fee_status = ?, address = ?, phone = ?,
               email = ?, gender = ?, dob = ?
             WHERE id = ?",
            params![
                student.name,
                student.guardian_name,
                student.roll_number,
                student.class_name,
                student.admission_date,
                student.fee_status.as_str(),
                student.paid_amount,
                student.total_amount,
                student.last_payment_date,
                monthly_json,
                student.address,
                student.phone,
                student.email,
                student.gender,
                student.dob,
                student.id,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(student.clone()))
    }

    fn delete_student(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM students WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    fn list_classes(&self) -> Result<Vec<ClassRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, teacher FROM classes ORDER BY id")?;
        let classes = stmt
            .query_map([], class_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(classes)
    }

    fn get_class(&self, id: i64) -> Result<Option<ClassRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, name, teacher FROM classes WHERE id = ?",
                [id],
                class_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn add_class(&self, name: &str, teacher: &str) -> Result<ClassRecord> {
        self.conn.execute(
            "INSERT INTO classes(name, teacher) VALUES(?, ?)",
            params![name, teacher],
        )?;
        Ok(ClassRecord {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            teacher: teacher.to_string(),
        })
    }

    fn update_class(&self, record: &ClassRecord) -> Result<Option<ClassRecord>> {
        let changed = self.conn.execute(
            "UPDATE classes SET name = ?, teacher = ? WHERE id = ?",
            params![record.name, record.teacher, record.id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(record.clone()))
    }

    fn delete_class(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM classes WHERE id = ?", [id])?;
        Ok(changed > 0)
    }

    fn upsert_fee_structure(
        &self,
        class: &str,
        monthly_fee: i64,
        admission_fee: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO fee_structure(class, monthly_fee, admission_fee)
             VALUES(?, ?, ?)
             ON CONFLICT(class) DO UPDATE SET
               monthly_fee = excluded.monthly_fee,
               admission_fee = excluded.admission_fee",
            params![class, monthly_fee, admission_fee],
        )?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        for table in ["students", "classes", "fee_structure"] {
            self.conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        let _ = self.conn.execute(
            "DELETE FROM sqlite_sequence WHERE name IN ('students', 'classes')",
            [],
        );
        Ok(())
    }
}
