use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::error::CoreError;
use crate::model::{
    AttendanceStatus, ClassCode, Student, StudentId, SubjectId, Teacher, TeacherId,
};
use crate::store::{NewStudentAttendance, NewTeacherAttendance, RecordStore, StudentQuery};

/// One session's worth of in-memory status marks, one slot per roster
/// member. Purely local until committed; setting a status twice keeps
/// the last value.
#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    date: NaiveDate,
    marks: HashMap<i64, Option<AttendanceStatus>>,
}

impl AttendanceSheet {
    pub fn prepare(roster_ids: impl IntoIterator<Item = i64>, date: NaiveDate) -> Self {
        Self {
            date,
            marks: roster_ids.into_iter().map(|id| (id, None)).collect(),
        }
    }

    pub fn set_status(&mut self, person: i64, status: AttendanceStatus) {
        self.marks.insert(person, Some(status));
    }

    pub fn status_of(&self, person: i64) -> Option<AttendanceStatus> {
        self.marks.get(&person).copied().flatten()
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn unfilled(&self) -> usize {
        self.marks.values().filter(|s| s.is_none()).count()
    }
}

/// Teacher and subject the student session was held for; stored on
/// every row of the batch.
#[derive(Debug, Clone, Copy)]
pub struct ClassSessionContext {
    pub teacher_id: TeacherId,
    pub subject_id: SubjectId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub present: usize,
    pub excused: usize,
    pub sick: usize,
    pub absent: usize,
}

impl StatusTally {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::Sick => self.sick += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.excused + self.sick + self.absent
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAttendanceRow {
    pub student_id: StudentId,
    pub student: String,
    pub class_label: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAttendanceSummary {
    pub date: NaiveDate,
    pub rows: Vec<StudentAttendanceRow>,
    pub tally: StatusTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherAttendanceRow {
    pub teacher_id: TeacherId,
    pub teacher: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherAttendanceSummary {
    pub date: NaiveDate,
    pub rows: Vec<TeacherAttendanceRow>,
    pub tally: StatusTally,
}

/// All-or-nothing commit: every roster member must carry a status or
/// the whole batch is rejected before any write.
pub async fn commit_student_session(
    store: &dyn RecordStore,
    sheet: &AttendanceSheet,
    roster: &[Student],
    context: ClassSessionContext,
) -> Result<usize, CoreError> {
    let mut rows = Vec::with_capacity(roster.len());
    let mut missing = 0usize;
    for member in roster {
        match sheet.status_of(member.id) {
            Some(status) => rows.push(NewStudentAttendance {
                student_id: member.id,
                teacher_id: context.teacher_id,
                subject_id: context.subject_id,
                date: sheet.date(),
                status,
            }),
            None => missing += 1,
        }
    }
    if missing > 0 {
        return Err(CoreError::IncompleteSubmission { missing });
    }
    let written = store.insert_student_attendance(rows).await?;
    info!(date = %sheet.date(), rows = written, "student attendance committed");
    Ok(written)
}

pub async fn commit_teacher_session(
    store: &dyn RecordStore,
    sheet: &AttendanceSheet,
    roster: &[Teacher],
) -> Result<usize, CoreError> {
    let mut rows = Vec::with_capacity(roster.len());
    let mut missing = 0usize;
    for member in roster {
        match sheet.status_of(member.id) {
            Some(status) => rows.push(NewTeacherAttendance {
                teacher_id: member.id,
                date: sheet.date(),
                status,
            }),
            None => missing += 1,
        }
    }
    if missing > 0 {
        return Err(CoreError::IncompleteSubmission { missing });
    }
    let written = store.insert_teacher_attendance(rows).await?;
    info!(date = %sheet.date(), rows = written, "teacher attendance committed");
    Ok(written)
}

/// Rows for the date joined to names and class labels, plus the
/// per-status breakdown. Read-only.
pub async fn fetch_student_summary(
    store: &dyn RecordStore,
    date: NaiveDate,
    class: Option<ClassCode>,
) -> Result<StudentAttendanceSummary, CoreError> {
    let students = store
        .list_students(StudentQuery {
            nis: None,
            class_code: class,
        })
        .await?;
    let classes = store.list_classes().await?;

    let records = if class.is_some() {
        let ids: Vec<StudentId> = students.iter().map(|s| s.id).collect();
        if ids.is_empty() {
            Vec::new()
        } else {
            store.list_student_attendance(date, Some(&ids)).await?
        }
    } else {
        store.list_student_attendance(date, None).await?
    };

    let by_id: HashMap<StudentId, &Student> = students.iter().map(|s| (s.id, s)).collect();
    let labels: HashMap<ClassCode, &str> =
        classes.iter().map(|c| (c.code, c.label.as_str())).collect();

    let mut tally = StatusTally::default();
    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        tally.add(record.status);
        let (student, class_label) = match by_id.get(&record.student_id) {
            Some(s) => (
                s.name.clone(),
                labels
                    .get(&s.class_code)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| s.class_code.to_string()),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        rows.push(StudentAttendanceRow {
            student_id: record.student_id,
            student,
            class_label,
            status: record.status,
        });
    }
    Ok(StudentAttendanceSummary { date, rows, tally })
}

pub async fn fetch_teacher_summary(
    store: &dyn RecordStore,
    date: NaiveDate,
) -> Result<TeacherAttendanceSummary, CoreError> {
    let teachers = store.list_teachers().await?;
    let records = store.list_teacher_attendance(date).await?;
    let by_id: HashMap<TeacherId, &Teacher> = teachers.iter().map(|t| (t.id, t)).collect();

    let mut tally = StatusTally::default();
    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        tally.add(record.status);
        rows.push(TeacherAttendanceRow {
            teacher_id: record.teacher_id,
            teacher: by_id
                .get(&record.teacher_id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "-".to_string()),
            status: record.status,
        });
    }
    Ok(TeacherAttendanceSummary { date, rows, tally })
}
