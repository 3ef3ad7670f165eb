use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{
    IncomeQuery, NewClassRoom, NewExpense, NewIncome, NewInfraction, NewStudent,
    NewStudentAttendance, NewSubject, NewTeacher, NewTeacherAttendance, RecordStore, StoreError,
    StudentQuery, StudentUpdate, TeacherUpdate,
};
use crate::model::{
    AttendanceStatus, ClassCode, ClassRoom, ExpenseRecord, IncomeRecord, InfractionRecord,
    PaymentMonth, Student, StudentAttendance, StudentId, Subject, SubjectId, Teacher,
    TeacherAttendance, TeacherId,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::RowNotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// PostgreSQL record store. Expects the schema in
/// `migrations/0001_init.sql`; all queries are bound at runtime so the
/// crate builds without a live database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn connect_from_env() -> Result<Self, StoreError> {
        if std::env::var("ENV").ok().as_deref() != Some("prod") {
            dotenvy::dotenv().ok();
        }
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Backend("DATABASE_URL is not set".to_string()))?;
        Self::connect(&url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: i64,
    nis: String,
    name: String,
    class_code: i64,
    created_at: DateTime<Utc>,
}

impl From<StudentRow> for Student {
    fn from(r: StudentRow) -> Self {
        Self {
            id: r.id,
            nis: r.nis,
            name: r.name,
            class_code: ClassCode(r.class_code),
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TeacherRow {
    id: i64,
    name: String,
    nip: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TeacherRow> for Teacher {
    fn from(r: TeacherRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            nip: r.nip,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ClassRow {
    id: i64,
    code: i64,
    label: String,
    created_at: DateTime<Utc>,
}

impl From<ClassRow> for ClassRoom {
    fn from(r: ClassRow) -> Self {
        Self {
            id: r.id,
            code: ClassCode(r.code),
            label: r.label,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: i64,
    name: String,
    teacher_id: i64,
    class_code: i64,
    created_at: DateTime<Utc>,
}

impl From<SubjectRow> for Subject {
    fn from(r: SubjectRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            teacher_id: r.teacher_id,
            class_code: ClassCode(r.class_code),
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IncomeRow {
    id: Uuid,
    date: NaiveDate,
    student_id: i64,
    bill: String,
    month: Option<String>,
    amount: Decimal,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IncomeRow> for IncomeRecord {
    type Error = StoreError;

    fn try_from(r: IncomeRow) -> Result<Self, StoreError> {
        let month = r
            .month
            .map(|m| {
                PaymentMonth::parse(&m)
                    .ok_or_else(|| StoreError::Backend(format!("unexpected month value: {m}")))
            })
            .transpose()?;
        Ok(Self {
            id: r.id,
            date: r.date,
            student_id: r.student_id,
            bill: r.bill,
            month,
            amount: r.amount,
            note: r.note,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: Uuid,
    date: NaiveDate,
    amount: Decimal,
    note: String,
    created_at: DateTime<Utc>,
}

impl From<ExpenseRow> for ExpenseRecord {
    fn from(r: ExpenseRow) -> Self {
        Self {
            id: r.id,
            date: r.date,
            amount: r.amount,
            note: r.note,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StudentAttendanceRow {
    id: i64,
    student_id: i64,
    teacher_id: i64,
    subject_id: i64,
    date: NaiveDate,
    status: String,
}

impl TryFrom<StudentAttendanceRow> for StudentAttendance {
    type Error = StoreError;

    fn try_from(r: StudentAttendanceRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            student_id: r.student_id,
            teacher_id: r.teacher_id,
            subject_id: r.subject_id,
            date: r.date,
            status: parse_status(&r.status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TeacherAttendanceRow {
    id: i64,
    teacher_id: i64,
    date: NaiveDate,
    status: String,
}

impl TryFrom<TeacherAttendanceRow> for TeacherAttendance {
    type Error = StoreError;

    fn try_from(r: TeacherAttendanceRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: r.id,
            teacher_id: r.teacher_id,
            date: r.date,
            status: parse_status(&r.status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InfractionRow {
    id: i64,
    student_id: i64,
    description: String,
    points: i32,
    date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<InfractionRow> for InfractionRecord {
    fn from(r: InfractionRow) -> Self {
        Self {
            id: r.id,
            student_id: r.student_id,
            description: r.description,
            points: r.points,
            date: r.date,
            created_at: r.created_at,
        }
    }
}

fn parse_status(value: &str) -> Result<AttendanceStatus, StoreError> {
    AttendanceStatus::parse(value)
        .ok_or_else(|| StoreError::Backend(format!("unexpected status value: {value}")))
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_student(&self, row: NewStudent) -> Result<Student, StoreError> {
        let rec: StudentRow = sqlx::query_as(
            r#"
            INSERT INTO students (nis, name, class_code, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, nis, name, class_code, created_at
            "#,
        )
        .bind(&row.nis)
        .bind(&row.name)
        .bind(row.class_code.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn update_student(
        &self,
        id: StudentId,
        row: StudentUpdate,
    ) -> Result<Student, StoreError> {
        let rec: Option<StudentRow> = sqlx::query_as(
            r#"
            UPDATE students SET nis = $1, name = $2, class_code = $3
            WHERE id = $4
            RETURNING id, nis, name, class_code, created_at
            "#,
        )
        .bind(&row.nis)
        .bind(&row.name)
        .bind(row.class_code.0)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        rec.map(Student::from).ok_or(StoreError::RowNotFound)
    }

    async fn delete_student(&self, id: StudentId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_students(&self, query: StudentQuery) -> Result<Vec<Student>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, nis, name, class_code, created_at FROM students WHERE 1 = 1",
        );
        if let Some(nis) = query.nis {
            qb.push(" AND nis = ");
            qb.push_bind(nis);
        }
        if let Some(code) = query.class_code {
            qb.push(" AND class_code = ");
            qb.push_bind(code.0);
        }
        qb.push(" ORDER BY name");
        let rows: Vec<StudentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn insert_teacher(&self, row: NewTeacher) -> Result<Teacher, StoreError> {
        let rec: TeacherRow = sqlx::query_as(
            r#"
            INSERT INTO teachers (name, nip, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, name, nip, created_at
            "#,
        )
        .bind(&row.name)
        .bind(&row.nip)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn update_teacher(
        &self,
        id: TeacherId,
        row: TeacherUpdate,
    ) -> Result<Teacher, StoreError> {
        let rec: Option<TeacherRow> = sqlx::query_as(
            r#"
            UPDATE teachers SET name = $1, nip = $2
            WHERE id = $3
            RETURNING id, name, nip, created_at
            "#,
        )
        .bind(&row.name)
        .bind(&row.nip)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        rec.map(Teacher::from).ok_or(StoreError::RowNotFound)
    }

    async fn delete_teacher(&self, id: TeacherId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM teachers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_teachers(&self) -> Result<Vec<Teacher>, StoreError> {
        let rows: Vec<TeacherRow> =
            sqlx::query_as("SELECT id, name, nip, created_at FROM teachers ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Teacher::from).collect())
    }

    async fn insert_class(&self, row: NewClassRoom) -> Result<ClassRoom, StoreError> {
        let rec: ClassRow = sqlx::query_as(
            r#"
            INSERT INTO classes (code, label, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, code, label, created_at
            "#,
        )
        .bind(row.code.0)
        .bind(&row.label)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn update_class(&self, id: i64, label: String) -> Result<ClassRoom, StoreError> {
        let rec: Option<ClassRow> = sqlx::query_as(
            r#"
            UPDATE classes SET label = $1
            WHERE id = $2
            RETURNING id, code, label, created_at
            "#,
        )
        .bind(&label)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        rec.map(ClassRoom::from).ok_or(StoreError::RowNotFound)
    }

    async fn delete_class(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_classes(&self) -> Result<Vec<ClassRoom>, StoreError> {
        let rows: Vec<ClassRow> =
            sqlx::query_as("SELECT id, code, label, created_at FROM classes ORDER BY code")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(ClassRoom::from).collect())
    }

    async fn insert_subject(&self, row: NewSubject) -> Result<Subject, StoreError> {
        let rec: SubjectRow = sqlx::query_as(
            r#"
            INSERT INTO subjects (name, teacher_id, class_code, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, teacher_id, class_code, created_at
            "#,
        )
        .bind(&row.name)
        .bind(row.teacher_id)
        .bind(row.class_code.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn delete_subject(&self, id: SubjectId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_subjects(
        &self,
        class_code: Option<ClassCode>,
    ) -> Result<Vec<Subject>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, name, teacher_id, class_code, created_at FROM subjects WHERE 1 = 1",
        );
        if let Some(code) = class_code {
            qb.push(" AND class_code = ");
            qb.push_bind(code.0);
        }
        qb.push(" ORDER BY name");
        let rows: Vec<SubjectRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Subject::from).collect())
    }

    async fn insert_income(&self, row: NewIncome) -> Result<IncomeRecord, StoreError> {
        let rec: IncomeRow = sqlx::query_as(
            r#"
            INSERT INTO income (id, date, student_id, bill, month, amount, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, date, student_id, bill, month, amount, note, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.date)
        .bind(row.student_id)
        .bind(&row.bill)
        .bind(row.month.map(PaymentMonth::name))
        .bind(row.amount)
        .bind(&row.note)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        rec.try_into()
    }

    async fn list_income(&self, query: IncomeQuery) -> Result<Vec<IncomeRecord>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, date, student_id, bill, month, amount, note, created_at FROM income WHERE 1 = 1",
        );
        if let Some(id) = query.student_id {
            qb.push(" AND student_id = ");
            qb.push_bind(id);
        }
        if let Some(bill) = query.bill {
            qb.push(" AND bill = ");
            qb.push_bind(bill);
        }
        if let Some(month) = query.month {
            qb.push(" AND month = ");
            qb.push_bind(month.name());
        }
        qb.push(" ORDER BY date DESC, created_at DESC");
        let rows: Vec<IncomeRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(IncomeRecord::try_from).collect()
    }

    async fn insert_expense(&self, row: NewExpense) -> Result<ExpenseRecord, StoreError> {
        let rec: ExpenseRow = sqlx::query_as(
            r#"
            INSERT INTO expense (id, date, amount, note, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, date, amount, note, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.date)
        .bind(row.amount)
        .bind(&row.note)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn list_expense(&self) -> Result<Vec<ExpenseRecord>, StoreError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            "SELECT id, date, amount, note, created_at FROM expense ORDER BY date DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ExpenseRecord::from).collect())
    }

    async fn insert_student_attendance(
        &self,
        rows: Vec<NewStudentAttendance>,
    ) -> Result<usize, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO student_attendance (student_id, teacher_id, subject_id, date, status)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(row.student_id)
            .bind(row.teacher_id)
            .bind(row.subject_id)
            .bind(row.date)
            .bind(row.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn list_student_attendance(
        &self,
        date: NaiveDate,
        student_ids: Option<&[StudentId]>,
    ) -> Result<Vec<StudentAttendance>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, student_id, teacher_id, subject_id, date, status FROM student_attendance WHERE date = ",
        );
        qb.push_bind(date);
        if let Some(ids) = student_ids {
            qb.push(" AND student_id = ANY(");
            qb.push_bind(ids.to_vec());
            qb.push(")");
        }
        qb.push(" ORDER BY student_id, id");
        let rows: Vec<StudentAttendanceRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(StudentAttendance::try_from).collect()
    }

    async fn insert_teacher_attendance(
        &self,
        rows: Vec<NewTeacherAttendance>,
    ) -> Result<usize, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        for row in &rows {
            sqlx::query(
                "INSERT INTO teacher_attendance (teacher_id, date, status) VALUES ($1, $2, $3)",
            )
            .bind(row.teacher_id)
            .bind(row.date)
            .bind(row.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn list_teacher_attendance(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<TeacherAttendance>, StoreError> {
        let rows: Vec<TeacherAttendanceRow> = sqlx::query_as(
            "SELECT id, teacher_id, date, status FROM teacher_attendance WHERE date = $1 ORDER BY teacher_id, id",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TeacherAttendance::try_from).collect()
    }

    async fn insert_infraction(&self, row: NewInfraction) -> Result<InfractionRecord, StoreError> {
        let rec: InfractionRow = sqlx::query_as(
            r#"
            INSERT INTO infractions (student_id, description, points, date, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, student_id, description, points, date, created_at
            "#,
        )
        .bind(row.student_id)
        .bind(&row.description)
        .bind(row.points)
        .bind(row.date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.into())
    }

    async fn list_infractions(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<InfractionRecord>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, student_id, description, points, date, created_at FROM infractions WHERE 1 = 1",
        );
        if let Some(id) = student_id {
            qb.push(" AND student_id = ");
            qb.push_bind(id);
        }
        qb.push(" ORDER BY date DESC, id DESC");
        let rows: Vec<InfractionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(InfractionRecord::from).collect())
    }
}
