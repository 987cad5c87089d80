use anyhow::{bail, Context, Result};
use log::{debug, error};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::json;

use crate::model::{ClassRecord, FeeStatus, MonthlyFees, NewStudent, Student};
use crate::repo::Store;

/// Hosted-table implementation of [`Store`].
///
/// Every operation is a single pass-through HTTP call against a PostgREST
/// endpoint (`/rest/v1/<table>`): no retries, no backoff, no local caching.
/// Failures are logged here, at the call site nearest the wire, and surfaced
/// to the handler as plain errors.
pub struct RemoteStore {
    base: String,
    key: String,
    client: Client,
}

impl RemoteStore {
    /// Build from `SUPABASE_URL` / `SUPABASE_ANON_KEY`. Returns None when
    /// either is missing or empty, which the caller treats as "no remote
    /// configured".
    pub fn from_env() -> Option<Self> {
        let base = std::env::var("SUPABASE_URL").ok()?;
        let key = std::env::var("SUPABASE_ANON_KEY").ok()?;
        if base.trim().is_empty() || key.trim().is_empty() {
            return None;
        }
        Some(Self {
            base: base.trim_end_matches('/').to_string(),
            key,
            client: Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Lightweight connectivity check: one row of one column off the students
    /// table. Any transport or status failure reads as "not connected".
    pub fn probe(&self) -> bool {
        let url = self.table_url("students");
        let result = self
            .request(self.client.get(&url))
            .query(&[("select", "id"), ("limit", "1")])
            .send();
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                error!("remote store probe returned {}", resp.status());
                false
            }
            Err(e) => {
                error!("remote store probe failed: {}", e);
                false
            }
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
    }

    fn fetch_rows<T: serde::de::DeserializeOwned>(&self, table: &str, id: Option<i64>) -> Result<Vec<T>> {
        let mut builder = self
            .request(self.client.get(self.table_url(table)))
            .query(&[("select", "*")]);
        if let Some(id) = id {
            builder = builder.query(&[("id", format!("eq.{}", id))]);
        }
        let rows = builder
            .send()
            .with_context(|| format!("fetch {} from remote store", table))?
            .error_for_status()?
            .json::<Vec<T>>()
            .with_context(|| format!("decode {} rows", table))?;
        Ok(rows)
    }

    fn insert_row<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let mut rows = self
            .request(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .with_context(|| format!("insert into {} on remote store", table))?
            .error_for_status()?
            .json::<Vec<T>>()
            .with_context(|| format!("decode inserted {} row", table))?;
        match rows.pop() {
            Some(row) => Ok(row),
            None => bail!("remote store returned no row for {} insert", table),
        }
    }

    fn patch_row<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        id: i64,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        let mut rows = self
            .request(self.client.patch(self.table_url(table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .with_context(|| format!("update {} on remote store", table))?
            .error_for_status()?
            .json::<Vec<T>>()
            .with_context(|| format!("decode updated {} row", table))?;
        Ok(rows.pop())
    }

    fn delete_row(&self, table: &str, id: i64) -> Result<bool> {
        let rows = self
            .request(self.client.delete(self.table_url(table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .send()
            .with_context(|| format!("delete from {} on remote store", table))?
            .error_for_status()?
            .json::<Vec<serde_json::Value>>()
            .with_context(|| format!("decode deleted {} rows", table))?;
        Ok(!rows.is_empty())
    }
}

impl Store for RemoteStore {
    fn list_students(&self) -> Result<Vec<Student>> {
        self.fetch_rows("students", None)
    }

    fn get_student(&self, id: i64) -> Result<Option<Student>> {
        let mut rows: Vec<Student> = self.fetch_rows("students", Some(id))?;
        Ok(rows.pop())
    }

    fn add_student(&self, new: &NewStudent) -> Result<Student> {
        // Fee state is seeded here, not accepted from the caller: a new
        // student always starts unpaid with a clean month map.
        let body = json!({
            "name": new.name,
            "guardianName": new.guardian_name,
            "rollNumber": new.roll_number,
            "className": new.class_name,
            "admissionDate": new.admission_date,
            "feeStatus": FeeStatus::Unpaid,
            "paidAmount": 0,
            "totalAmount": new.total_amount,
            "monthlyFeeStatus": MonthlyFees::all_unpaid(),
            "address": new.address,
            "phone": new.phone,
            "email": new.email,
            "gender": new.gender,
            "dob": new.dob,
        });
        self.insert_row("students", body)
    }

    fn update_student(&self, student: &Student) -> Result<Option<Student>> {
        debug!("remote update student {}", student.id);
        self.patch_row("students", student.id, serde_json::to_value(student)?)
    }

    fn delete_student(&self, id: i64) -> Result<bool> {
        self.delete_row("students", id)
    }

    fn list_classes(&self) -> Result<Vec<ClassRecord>> {
        self.fetch_rows("classes", None)
    }

    fn get_class(&self, id: i64) -> Result<Option<ClassRecord>> {
        let mut rows: Vec<ClassRecord> = self.fetch_rows("classes", Some(id))?;
        Ok(rows.pop())
    }

    fn add_class(&self, name: &str, teacher: &str) -> Result<ClassRecord> {
        self.insert_row("classes", json!({ "name": name, "teacher": teacher }))
    }

    fn update_class(&self, record: &ClassRecord) -> Result<Option<ClassRecord>> {
        self.patch_row("classes", record.id, serde_json::to_value(record)?)
    }

    fn delete_class(&self, id: i64) -> Result<bool> {
        self.delete_row("classes", id)
    }

    fn upsert_fee_structure(
        &self,
        class: &str,
        monthly_fee: i64,
        admission_fee: i64,
    ) -> Result<()> {
        self.request(self.client.post(self.table_url("fee_structure")))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({
                "class": class,
                "monthlyFee": monthly_fee,
                "admissionFee": admission_fee,
            }))
            .send()
            .context("upsert fee structure on remote store")?
            .error_for_status()?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        bail!("store.reset is not supported on the remote backend")
    }
}
