use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{
    IncomeQuery, NewClassRoom, NewExpense, NewIncome, NewInfraction, NewStudent,
    NewStudentAttendance, NewSubject, NewTeacher, NewTeacherAttendance, RecordStore, StoreError,
    StudentQuery, StudentUpdate, TeacherUpdate,
};
use crate::model::{
    ClassCode, ClassRoom, ExpenseRecord, IncomeRecord, InfractionRecord, Student,
    StudentAttendance, StudentId, Subject, SubjectId, Teacher, TeacherAttendance, TeacherId,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    next_id: i64,
    students: Vec<Student>,
    teachers: Vec<Teacher>,
    classes: Vec<ClassRoom>,
    subjects: Vec<Subject>,
    student_attendance: Vec<StudentAttendance>,
    teacher_attendance: Vec<TeacherAttendance>,
    income: Vec<IncomeRecord>,
    expense: Vec<ExpenseRecord>,
    infractions: Vec<InfractionRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory record store. Backs every test and the demo fixture, and
/// can mirror its whole dataset to a JSON file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let reader = BufReader::new(file);
        let tables: Tables =
            serde_json::from_reader(reader).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            inner: RwLock::new(tables),
        })
    }

    pub fn save_path(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let tables = self.read()?;
        let file = File::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &*tables)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_student(&self, row: NewStudent) -> Result<Student, StoreError> {
        let mut tables = self.write()?;
        let student = Student {
            id: tables.next_id(),
            nis: row.nis,
            name: row.name,
            class_code: row.class_code,
            created_at: Utc::now(),
        };
        tables.students.push(student.clone());
        Ok(student)
    }

    async fn update_student(
        &self,
        id: StudentId,
        row: StudentUpdate,
    ) -> Result<Student, StoreError> {
        let mut tables = self.write()?;
        let student = tables
            .students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::RowNotFound)?;
        student.nis = row.nis;
        student.name = row.name;
        student.class_code = row.class_code;
        Ok(student.clone())
    }

    async fn delete_student(&self, id: StudentId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let before = tables.students.len();
        tables.students.retain(|s| s.id != id);
        if tables.students.len() == before {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_students(&self, query: StudentQuery) -> Result<Vec<Student>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<Student> = tables
            .students
            .iter()
            .filter(|s| query.nis.as_deref().map_or(true, |nis| s.nis == nis))
            .filter(|s| query.class_code.map_or(true, |code| s.class_code == code))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_teacher(&self, row: NewTeacher) -> Result<Teacher, StoreError> {
        let mut tables = self.write()?;
        let teacher = Teacher {
            id: tables.next_id(),
            name: row.name,
            nip: row.nip,
            created_at: Utc::now(),
        };
        tables.teachers.push(teacher.clone());
        Ok(teacher)
    }

    async fn update_teacher(
        &self,
        id: TeacherId,
        row: TeacherUpdate,
    ) -> Result<Teacher, StoreError> {
        let mut tables = self.write()?;
        let teacher = tables
            .teachers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::RowNotFound)?;
        teacher.name = row.name;
        teacher.nip = row.nip;
        Ok(teacher.clone())
    }

    async fn delete_teacher(&self, id: TeacherId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let before = tables.teachers.len();
        tables.teachers.retain(|t| t.id != id);
        if tables.teachers.len() == before {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_teachers(&self) -> Result<Vec<Teacher>, StoreError> {
        let tables = self.read()?;
        let mut rows = tables.teachers.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_class(&self, row: NewClassRoom) -> Result<ClassRoom, StoreError> {
        let mut tables = self.write()?;
        let class = ClassRoom {
            id: tables.next_id(),
            code: row.code,
            label: row.label,
            created_at: Utc::now(),
        };
        tables.classes.push(class.clone());
        Ok(class)
    }

    async fn update_class(&self, id: i64, label: String) -> Result<ClassRoom, StoreError> {
        let mut tables = self.write()?;
        let class = tables
            .classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::RowNotFound)?;
        class.label = label;
        Ok(class.clone())
    }

    async fn delete_class(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let before = tables.classes.len();
        tables.classes.retain(|c| c.id != id);
        if tables.classes.len() == before {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_classes(&self) -> Result<Vec<ClassRoom>, StoreError> {
        let tables = self.read()?;
        let mut rows = tables.classes.clone();
        rows.sort_by_key(|c| c.code);
        Ok(rows)
    }

    async fn insert_subject(&self, row: NewSubject) -> Result<Subject, StoreError> {
        let mut tables = self.write()?;
        let subject = Subject {
            id: tables.next_id(),
            name: row.name,
            teacher_id: row.teacher_id,
            class_code: row.class_code,
            created_at: Utc::now(),
        };
        tables.subjects.push(subject.clone());
        Ok(subject)
    }

    async fn delete_subject(&self, id: SubjectId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let before = tables.subjects.len();
        tables.subjects.retain(|s| s.id != id);
        if tables.subjects.len() == before {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_subjects(
        &self,
        class_code: Option<ClassCode>,
    ) -> Result<Vec<Subject>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<Subject> = tables
            .subjects
            .iter()
            .filter(|s| class_code.map_or(true, |code| s.class_code == code))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_income(&self, row: NewIncome) -> Result<IncomeRecord, StoreError> {
        let mut tables = self.write()?;
        let record = IncomeRecord {
            id: Uuid::new_v4(),
            date: row.date,
            student_id: row.student_id,
            bill: row.bill,
            month: row.month,
            amount: row.amount,
            note: row.note,
            created_at: Utc::now(),
        };
        tables.income.push(record.clone());
        Ok(record)
    }

    async fn list_income(&self, query: IncomeQuery) -> Result<Vec<IncomeRecord>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<IncomeRecord> = tables
            .income
            .iter()
            .filter(|r| query.student_id.map_or(true, |id| r.student_id == id))
            .filter(|r| query.bill.as_deref().map_or(true, |bill| r.bill == bill))
            .filter(|r| query.month.map_or(true, |month| r.month == Some(month)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(rows)
    }

    async fn insert_expense(&self, row: NewExpense) -> Result<ExpenseRecord, StoreError> {
        let mut tables = self.write()?;
        let record = ExpenseRecord {
            id: Uuid::new_v4(),
            date: row.date,
            amount: row.amount,
            note: row.note,
            created_at: Utc::now(),
        };
        tables.expense.push(record.clone());
        Ok(record)
    }

    async fn list_expense(&self) -> Result<Vec<ExpenseRecord>, StoreError> {
        let tables = self.read()?;
        let mut rows = tables.expense.clone();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(rows)
    }

    async fn insert_student_attendance(
        &self,
        rows: Vec<NewStudentAttendance>,
    ) -> Result<usize, StoreError> {
        // one lock scope, the batch lands whole
        let mut tables = self.write()?;
        let count = rows.len();
        for row in rows {
            let id = tables.next_id();
            tables.student_attendance.push(StudentAttendance {
                id,
                student_id: row.student_id,
                teacher_id: row.teacher_id,
                subject_id: row.subject_id,
                date: row.date,
                status: row.status,
            });
        }
        Ok(count)
    }

    async fn list_student_attendance(
        &self,
        date: NaiveDate,
        student_ids: Option<&[StudentId]>,
    ) -> Result<Vec<StudentAttendance>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<StudentAttendance> = tables
            .student_attendance
            .iter()
            .filter(|r| r.date == date)
            .filter(|r| student_ids.map_or(true, |ids| ids.contains(&r.student_id)))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.student_id, r.id));
        Ok(rows)
    }

    async fn insert_teacher_attendance(
        &self,
        rows: Vec<NewTeacherAttendance>,
    ) -> Result<usize, StoreError> {
        let mut tables = self.write()?;
        let count = rows.len();
        for row in rows {
            let id = tables.next_id();
            tables.teacher_attendance.push(TeacherAttendance {
                id,
                teacher_id: row.teacher_id,
                date: row.date,
                status: row.status,
            });
        }
        Ok(count)
    }

    async fn list_teacher_attendance(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<TeacherAttendance>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<TeacherAttendance> = tables
            .teacher_attendance
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.teacher_id, r.id));
        Ok(rows)
    }

    async fn insert_infraction(&self, row: NewInfraction) -> Result<InfractionRecord, StoreError> {
        let mut tables = self.write()?;
        let record = InfractionRecord {
            id: tables.next_id(),
            student_id: row.student_id,
            description: row.description,
            points: row.points,
            date: row.date,
            created_at: Utc::now(),
        };
        tables.infractions.push(record.clone());
        Ok(record)
    }

    async fn list_infractions(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<InfractionRecord>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<InfractionRecord> = tables
            .infractions
            .iter()
            .filter(|r| student_id.map_or(true, |id| r.student_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn students_are_listed_by_name() {
        let store = MemoryStore::new();
        for (nis, name) in [("01", "Citra"), ("02", "Agus"), ("03", "Budi")] {
            store
                .insert_student(NewStudent {
                    nis: nis.to_string(),
                    name: name.to_string(),
                    class_code: ClassCode(10),
                })
                .await
                .unwrap();
        }
        let rows = store.list_students(StudentQuery::default()).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Agus", "Budi", "Citra"]);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryStore::new();
        let err = store
            .update_student(
                99,
                StudentUpdate {
                    nis: "x".to_string(),
                    name: "x".to_string(),
                    class_code: ClassCode(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RowNotFound));
        assert!(matches!(
            store.delete_teacher(42).await.unwrap_err(),
            StoreError::RowNotFound
        ));
    }

    #[tokio::test]
    async fn income_query_is_a_conjunction() {
        let store = MemoryStore::new();
        for (student_id, bill, month) in [
            (1, "SPP", Some(crate::model::PaymentMonth::Januari)),
            (1, "SPP", Some(crate::model::PaymentMonth::Februari)),
            (2, "SPP", Some(crate::model::PaymentMonth::Januari)),
            (1, "Kalender", None),
        ] {
            store
                .insert_income(NewIncome {
                    date: date(2025, 1, 10),
                    student_id,
                    bill: bill.to_string(),
                    month,
                    amount: dec!(100000),
                    note: None,
                })
                .await
                .unwrap();
        }
        let rows = store
            .list_income(IncomeQuery {
                student_id: Some(1),
                bill: Some("SPP".to_string()),
                month: Some(crate::model::PaymentMonth::Januari),
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, 1);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sekolah.json");

        let store = MemoryStore::new();
        store
            .insert_class(NewClassRoom {
                code: ClassCode(10),
                label: "Kelas 10".to_string(),
            })
            .await
            .unwrap();
        store
            .insert_student(NewStudent {
                nis: "2024001".to_string(),
                name: "Budi Santoso".to_string(),
                class_code: ClassCode(10),
            })
            .await
            .unwrap();
        store.save_path(&path).unwrap();

        let restored = MemoryStore::load_path(&path).unwrap();
        assert_eq!(
            restored.list_students(StudentQuery::default()).await.unwrap(),
            store.list_students(StudentQuery::default()).await.unwrap()
        );
        assert_eq!(restored.list_classes().await.unwrap().len(), 1);
    }
}
