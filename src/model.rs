use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type StudentId = i64;
pub type TeacherId = i64;
pub type SubjectId = i64;

/// External class-sequence number. This is the join key carried by
/// students and subjects; it is NOT the class row's internal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassCode(pub i64);

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRoom {
    pub id: i64,
    pub code: ClassCode,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub nis: String,
    pub name: String,
    pub class_code: ClassCode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    pub nip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub teacher_id: TeacherId,
    pub class_code: ClassCode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Excused,
    Sick,
    Absent,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Excused,
        AttendanceStatus::Sick,
        AttendanceStatus::Absent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub id: i64,
    pub student_id: StudentId,
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherAttendance {
    pub id: i64,
    pub teacher_id: TeacherId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Calendar month a tuition payment is booked against. The labels are
/// the canonical values carried by payment rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMonth {
    Januari,
    Februari,
    Maret,
    April,
    Mei,
    Juni,
    Juli,
    Agustus,
    September,
    Oktober,
    November,
    Desember,
}

impl PaymentMonth {
    pub const ALL: [PaymentMonth; 12] = [
        PaymentMonth::Januari,
        PaymentMonth::Februari,
        PaymentMonth::Maret,
        PaymentMonth::April,
        PaymentMonth::Mei,
        PaymentMonth::Juni,
        PaymentMonth::Juli,
        PaymentMonth::Agustus,
        PaymentMonth::September,
        PaymentMonth::Oktober,
        PaymentMonth::November,
        PaymentMonth::Desember,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PaymentMonth::Januari => "Januari",
            PaymentMonth::Februari => "Februari",
            PaymentMonth::Maret => "Maret",
            PaymentMonth::April => "April",
            PaymentMonth::Mei => "Mei",
            PaymentMonth::Juni => "Juni",
            PaymentMonth::Juli => "Juli",
            PaymentMonth::Agustus => "Agustus",
            PaymentMonth::September => "September",
            PaymentMonth::Oktober => "Oktober",
            PaymentMonth::November => "November",
            PaymentMonth::Desember => "Desember",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for PaymentMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BillKind {
    Spp,
    DaftarUlang,
    PpdbPutra,
    PpdbPutri,
    Pts,
    BukuKelas12,
    BukuKelas11,
    BukuKelas10,
    Kalender,
    Lainnya(String),
}

impl BillKind {
    pub fn label(&self) -> &str {
        match self {
            BillKind::Spp => "SPP",
            BillKind::DaftarUlang => "Daftar Ulang",
            BillKind::PpdbPutra => "PPDB Putra",
            BillKind::PpdbPutri => "PPDB Putri",
            BillKind::Pts => "PTS",
            BillKind::BukuKelas12 => "Buku Kelas 12",
            BillKind::BukuKelas11 => "Buku Kelas 11",
            BillKind::BukuKelas10 => "Buku Kelas 10",
            BillKind::Kalender => "Kalender",
            BillKind::Lainnya(label) => label,
        }
    }

    /// Fixed tariff for the bill kind; free-text bills carry no default
    /// and the caller must supply the amount.
    pub fn default_amount(&self) -> Option<Decimal> {
        let amount: i64 = match self {
            BillKind::Spp => 600_000,
            BillKind::DaftarUlang => 300_000,
            BillKind::PpdbPutra => 3_235_000,
            BillKind::PpdbPutri => 3_335_000,
            BillKind::Pts => 100_000,
            BillKind::BukuKelas12 => 711_000,
            BillKind::BukuKelas11 => 731_000,
            BillKind::BukuKelas10 => 714_000,
            BillKind::Kalender => 100_000,
            BillKind::Lainnya(_) => return None,
        };
        Some(Decimal::from(amount))
    }
}

impl From<String> for BillKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SPP" => BillKind::Spp,
            "Daftar Ulang" => BillKind::DaftarUlang,
            "PPDB Putra" => BillKind::PpdbPutra,
            "PPDB Putri" => BillKind::PpdbPutri,
            "PTS" => BillKind::Pts,
            "Buku Kelas 12" => BillKind::BukuKelas12,
            "Buku Kelas 11" => BillKind::BukuKelas11,
            "Buku Kelas 10" => BillKind::BukuKelas10,
            "Kalender" => BillKind::Kalender,
            _ => BillKind::Lainnya(value),
        }
    }
}

impl From<BillKind> for String {
    fn from(value: BillKind) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub student_id: StudentId,
    pub bill: String,
    pub month: Option<PaymentMonth>,
    pub amount: Decimal,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfractionRecord {
    pub id: i64,
    pub student_id: StudentId,
    pub description: String,
    pub points: i32,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
