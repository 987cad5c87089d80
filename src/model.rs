use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Calendar months in display order. All monthly fee maps are keyed by these
/// names and always emitted in this order.
pub const MONTHS: [&str; 12] = [
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
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Paid,
    Partial,
    Unpaid,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Paid => "paid",
            FeeStatus::Partial => "partial",
            FeeStatus::Unpaid => "unpaid",
        }
    }

    pub fn parse(s: &str) -> Option<FeeStatus> {
        match s {
            "paid" => Some(FeeStatus::Paid),
            "partial" => Some(FeeStatus::Partial),
            "unpaid" => Some(FeeStatus::Unpaid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthStatus {
    Paid,
    Unpaid,
}

impl MonthStatus {
    pub fn parse(s: &str) -> Option<MonthStatus> {
        match s {
            "paid" => Some(MonthStatus::Paid),
            "unpaid" => Some(MonthStatus::Unpaid),
            _ => None,
        }
    }
}

/// Per-calendar-month paid/unpaid flags for one student.
///
/// Wire format is a JSON object keyed by month name. Unknown keys are ignored
/// on input and months absent from the input stay unpaid, so a malformed map
/// can never wedge the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonthlyFees {
    paid: [bool; 12],
}

impl MonthlyFees {
    pub fn all_unpaid() -> Self {
        Self::default()
    }

    pub fn month_index(month: &str) -> Option<usize> {
        MONTHS.iter().position(|m| *m == month)
    }

    #[allow(dead_code)]
    pub fn get(&self, month: &str) -> Option<MonthStatus> {
        Self::month_index(month).map(|i| {
            if self.paid[i] {
                MonthStatus::Paid
            } else {
                MonthStatus::Unpaid
            }
        })
    }

    /// Returns false when the month name is unknown.
    pub fn set(&mut self, month: &str, status: MonthStatus) -> bool {
        match Self::month_index(month) {
            Some(i) => {
                self.paid[i] = status == MonthStatus::Paid;
                true
            }
            None => false,
        }
    }

    pub fn paid_count(&self) -> usize {
        self.paid.iter().filter(|p| **p).count()
    }

    /// Marks up to `n` of the earliest unpaid months as paid; returns how many
    /// were actually marked.
    pub fn mark_earliest_unpaid(&mut self, n: usize) -> usize {
        let mut marked = 0;
        for slot in self.paid.iter_mut() {
            if marked == n {
                break;
            }
            if !*slot {
                *slot = true;
                marked += 1;
            }
        }
        marked
    }

    /// Clears up to `n` of the latest paid months; returns how many were
    /// actually cleared.
    pub fn unmark_latest_paid(&mut self, n: usize) -> usize {
        let mut cleared = 0;
        for slot in self.paid.iter_mut().rev() {
            if cleared == n {
                break;
            }
            if *slot {
                *slot = false;
                cleared += 1;
            }
        }
        cleared
    }
}

impl Serialize for MonthlyFees {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(12))?;
        for (i, month) in MONTHS.iter().enumerate() {
            let status = if self.paid[i] { "paid" } else { "unpaid" };
            map.serialize_entry(month, status)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MonthlyFees {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MonthlyFeesVisitor;

        impl<'de> Visitor<'de> for MonthlyFeesVisitor {
            type Value = MonthlyFees;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a map of month name to \"paid\"/\"unpaid\"")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fees = MonthlyFees::default();
                while let Some((month, status)) = access.next_entry::<String, MonthStatus>()? {
                    fees.set(&month, status);
                }
                Ok(fees)
            }
        }

        deserializer.deserialize_map(MonthlyFeesVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub guardian_name: String,
    pub roll_number: String,
    pub class_name: String,
    pub admission_date: String,
    pub fee_status: FeeStatus,
    pub paid_amount: i64,
    pub total_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<String>,
    #[serde(default)]
    pub monthly_fee_status: MonthlyFees,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
}

fn default_total_amount() -> i64 {
    3000
}

/// Create-time fields for a student. Fee state is never accepted from the
/// caller: every student starts with all months unpaid.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub guardian_name: String,
    pub roll_number: String,
    pub class_name: String,
    pub admission_date: String,
    #[serde(default = "default_total_amount")]
    pub total_amount: i64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
}

/// Stored identity of a class. The count/fee rollups are derived on read, not
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: i64,
    pub name: String,
    pub teacher: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
    pub teacher: String,
    pub students_count: usize,
    pub total_fees: i64,
    pub collected_fees: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Cheque,
    #[serde(rename = "bank transfer")]
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::BankTransfer => "bank transfer",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentMethod> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "upi" => Some(PaymentMethod::Upi),
            "cheque" => Some(PaymentMethod::Cheque),
            "bank transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }

    pub fn all() -> [PaymentMethod; 5] {
        [
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::Upi,
            PaymentMethod::Cheque,
            PaymentMethod::BankTransfer,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "success" => Some(PaymentStatus::Success),
            "pending" => Some(PaymentStatus::Pending),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub student_id: i64,
    pub amount: i64,
    pub date: String,
    pub method: PaymentMethod,
    pub description: String,
    pub receipt_number: String,
    pub status: PaymentStatus,
    pub processed_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub student_id: i64,
    pub amount: i64,
    pub date: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub receipt_number: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub processed_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeFrequency {
    Annual,
    Monthly,
    #[serde(rename = "one-time")]
    OneTime,
}

impl FeeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeFrequency::Annual => "annual",
            FeeFrequency::Monthly => "monthly",
            FeeFrequency::OneTime => "one-time",
        }
    }

    pub fn parse(s: &str) -> Option<FeeFrequency> {
        match s {
            "annual" => Some(FeeFrequency::Annual),
            "monthly" => Some(FeeFrequency::Monthly),
            "one-time" => Some(FeeFrequency::OneTime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub amount: i64,
    pub frequency: FeeFrequency,
    /// Class names this fee applies to.
    pub applicable: Vec<String>,
    pub is_optional: bool,
    pub applied_date: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeeType {
    pub name: String,
    pub description: String,
    pub amount: i64,
    pub frequency: FeeFrequency,
    #[serde(default)]
    pub applicable: Vec<String>,
    #[serde(default)]
    pub is_optional: bool,
    pub applied_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: i64,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub is_active: bool,
    #[serde(default)]
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub academic_year_id: i64,
    #[serde(default)]
    pub exams: Vec<Exam>,
    pub fee_deadline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub term_id: String,
    #[serde(default)]
    pub classes: Vec<String>,
}
