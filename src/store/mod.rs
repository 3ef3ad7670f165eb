use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AttendanceStatus, ClassCode, ClassRoom, ExpenseRecord, IncomeRecord, InfractionRecord,
    PaymentMonth, Student, StudentAttendance, StudentId, Subject, SubjectId, Teacher,
    TeacherAttendance, TeacherId,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Opaque store-boundary failure. Row-not-found is the only case
/// callers branch on; everything else carries the backend's message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    RowNotFound,
    #[error("store failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudent {
    pub nis: String,
    pub name: String,
    pub class_code: ClassCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentUpdate {
    pub nis: String,
    pub name: String,
    pub class_code: ClassCode,
}

#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub nis: Option<String>,
    pub class_code: Option<ClassCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTeacher {
    pub name: String,
    pub nip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherUpdate {
    pub name: String,
    pub nip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClassRoom {
    pub code: ClassCode,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
    pub name: String,
    pub teacher_id: TeacherId,
    pub class_code: ClassCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncome {
    pub date: NaiveDate,
    pub student_id: StudentId,
    pub bill: String,
    pub month: Option<PaymentMonth>,
    pub amount: Decimal,
    pub note: Option<String>,
}

/// Conjunction of equality tests; an absent field always matches.
#[derive(Debug, Clone, Default)]
pub struct IncomeQuery {
    pub student_id: Option<StudentId>,
    pub bill: Option<String>,
    pub month: Option<PaymentMonth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudentAttendance {
    pub student_id: StudentId,
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTeacherAttendance {
    pub teacher_id: TeacherId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInfraction {
    pub student_id: StudentId,
    pub description: String,
    pub points: i32,
    pub date: NaiveDate,
}

/// The persistent table boundary. The store enforces uniqueness only
/// where its schema declares it; every business rule lives above this
/// trait. Selects take equality/set-membership predicates only and
/// return rows in a fixed order per collection.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_student(&self, row: NewStudent) -> Result<Student, StoreError>;
    async fn update_student(&self, id: StudentId, row: StudentUpdate)
        -> Result<Student, StoreError>;
    async fn delete_student(&self, id: StudentId) -> Result<(), StoreError>;
    /// Ordered by name.
    async fn list_students(&self, query: StudentQuery) -> Result<Vec<Student>, StoreError>;

    async fn insert_teacher(&self, row: NewTeacher) -> Result<Teacher, StoreError>;
    async fn update_teacher(&self, id: TeacherId, row: TeacherUpdate)
        -> Result<Teacher, StoreError>;
    async fn delete_teacher(&self, id: TeacherId) -> Result<(), StoreError>;
    /// Ordered by name.
    async fn list_teachers(&self) -> Result<Vec<Teacher>, StoreError>;

    async fn insert_class(&self, row: NewClassRoom) -> Result<ClassRoom, StoreError>;
    async fn update_class(&self, id: i64, label: String) -> Result<ClassRoom, StoreError>;
    async fn delete_class(&self, id: i64) -> Result<(), StoreError>;
    /// Ordered by class code.
    async fn list_classes(&self) -> Result<Vec<ClassRoom>, StoreError>;

    async fn insert_subject(&self, row: NewSubject) -> Result<Subject, StoreError>;
    async fn delete_subject(&self, id: SubjectId) -> Result<(), StoreError>;
    /// Ordered by name.
    async fn list_subjects(&self, class_code: Option<ClassCode>)
        -> Result<Vec<Subject>, StoreError>;

    async fn insert_income(&self, row: NewIncome) -> Result<IncomeRecord, StoreError>;
    /// Ordered by date descending, then creation time descending.
    async fn list_income(&self, query: IncomeQuery) -> Result<Vec<IncomeRecord>, StoreError>;

    async fn insert_expense(&self, row: NewExpense) -> Result<ExpenseRecord, StoreError>;
    /// Ordered by date descending, then creation time descending.
    async fn list_expense(&self) -> Result<Vec<ExpenseRecord>, StoreError>;

    /// Bulk insert; atomicity is backend-dependent (the Postgres store
    /// wraps the batch in a transaction, the memory store lands it
    /// under one lock).
    async fn insert_student_attendance(
        &self,
        rows: Vec<NewStudentAttendance>,
    ) -> Result<usize, StoreError>;
    async fn list_student_attendance(
        &self,
        date: NaiveDate,
        student_ids: Option<&[StudentId]>,
    ) -> Result<Vec<StudentAttendance>, StoreError>;

    async fn insert_teacher_attendance(
        &self,
        rows: Vec<NewTeacherAttendance>,
    ) -> Result<usize, StoreError>;
    async fn list_teacher_attendance(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<TeacherAttendance>, StoreError>;

    async fn insert_infraction(&self, row: NewInfraction) -> Result<InfractionRecord, StoreError>;
    /// Ordered by date descending, newest row first.
    async fn list_infractions(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<InfractionRecord>, StoreError>;
}
