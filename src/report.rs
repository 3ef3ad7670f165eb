use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::attendance::{self, StatusTally};
use crate::error::CoreError;
use crate::infraction::{self, StudentProfile};
use crate::ledger;
use crate::model::{ClassCode, InfractionRecord, StudentId};
use crate::store::{RecordStore, StudentQuery};

/// Conjunction of optional filters over the infraction report; string
/// matches are case-insensitive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub text: Option<String>,
    pub class_label: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfractionReportRow {
    pub id: i64,
    pub nis: String,
    pub student: String,
    pub class_label: String,
    pub date: NaiveDate,
    pub description: String,
    pub points: i32,
}

#[derive(Debug, Clone)]
pub struct StudentReport {
    pub profile: StudentProfile,
    pub infractions: Vec<InfractionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub students: usize,
    pub teachers: usize,
    pub subjects: usize,
    pub student_attendance: StatusTally,
    pub teacher_attendance: StatusTally,
    pub balance: Decimal,
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Every infraction joined to student name, nis and class label, then
/// filtered in memory.
pub async fn infraction_report(
    store: &dyn RecordStore,
    filter: &ReportFilter,
) -> Result<Vec<InfractionReportRow>, CoreError> {
    let records = store.list_infractions(None).await?;
    let students = store.list_students(StudentQuery::default()).await?;
    let classes = store.list_classes().await?;
    let by_id: HashMap<StudentId, _> = students.iter().map(|s| (s.id, s)).collect();
    let labels: HashMap<ClassCode, &str> =
        classes.iter().map(|c| (c.code, c.label.as_str())).collect();

    let rows = records
        .into_iter()
        .map(|r| {
            let (nis, student, class_label) = match by_id.get(&r.student_id) {
                Some(s) => (
                    s.nis.clone(),
                    s.name.clone(),
                    labels
                        .get(&s.class_code)
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| s.class_code.to_string()),
                ),
                None => ("-".to_string(), "-".to_string(), "-".to_string()),
            };
            InfractionReportRow {
                id: r.id,
                nis,
                student,
                class_label,
                date: r.date,
                description: r.description,
                points: r.points,
            }
        })
        .filter(|row| report_matches(row, filter))
        .collect();
    Ok(rows)
}

fn report_matches(row: &InfractionReportRow, filter: &ReportFilter) -> bool {
    let text_ok = match clean(filter.text.as_deref()) {
        None => true,
        Some(q) => {
            let q = q.to_lowercase();
            row.student.to_lowercase().contains(&q)
                || row.nis.to_lowercase().contains(&q)
                || row.class_label.to_lowercase().contains(&q)
        }
    };
    let class_ok = match clean(filter.class_label.as_deref()) {
        None => true,
        Some(label) => row.class_label.eq_ignore_ascii_case(label),
    };
    let month_ok = match clean(filter.month.as_deref()) {
        None => true,
        Some(m) => row.date.format("%Y-%m").to_string() == m,
    };
    let year_ok = match clean(filter.year.as_deref()) {
        None => true,
        Some(y) => row.date.format("%Y").to_string() == y,
    };
    text_ok && class_ok && month_ok && year_ok
}

/// The per-student page: profile plus every infraction, newest first.
pub async fn student_report(
    store: &dyn RecordStore,
    nis: &str,
) -> Result<StudentReport, CoreError> {
    let profile = infraction::lookup_student(store, nis).await?;
    let infractions = store.list_infractions(Some(profile.student.id)).await?;
    Ok(StudentReport {
        profile,
        infractions,
    })
}

pub async fn dashboard_snapshot(
    store: &dyn RecordStore,
    date: NaiveDate,
) -> Result<DashboardSnapshot, CoreError> {
    let students = store.list_students(StudentQuery::default()).await?.len();
    let teachers = store.list_teachers().await?.len();
    let subjects = store.list_subjects(None).await?.len();
    let student_attendance = attendance::fetch_student_summary(store, date, None).await?.tally;
    let teacher_attendance = attendance::fetch_teacher_summary(store, date).await?.tally;
    let balance = ledger::compute_balance(store).await?;
    Ok(DashboardSnapshot {
        students,
        teachers,
        subjects,
        student_attendance,
        teacher_attendance,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{AttendanceSheet, ClassSessionContext};
    use crate::ledger::{IncomeInput, ExpenseInput};
    use crate::model::{AttendanceStatus, BillKind, PaymentMonth};
    use crate::registry;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        registry::create_class(&store, "Kelas 10").await.unwrap();
        registry::create_class(&store, "Kelas 11").await.unwrap();
        for (nis, name, class) in [
            ("2024001", "Budi Santoso", 1),
            ("2024002", "Citra Lestari", 2),
        ] {
            registry::create_student(
                &store,
                registry::NewStudentInput {
                    name: name.to_string(),
                    nis: nis.to_string(),
                    class_code: Some(ClassCode(class)),
                },
            )
            .await
            .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn report_filters_compose_as_a_conjunction() {
        let store = seeded().await;
        let budi = infraction::lookup_student(&store, "2024001").await.unwrap();
        let citra = infraction::lookup_student(&store, "2024002").await.unwrap();
        infraction::record_infraction(&store, budi.student.id, "Berkelahi", date(2025, 2, 10))
            .await
            .unwrap();
        infraction::record_infraction(
            &store,
            citra.student.id,
            "Berkelahi",
            date(2024, 11, 3),
        )
        .await
        .unwrap();

        let rows = infraction_report(&store, &ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = infraction_report(
            &store,
            &ReportFilter {
                text: Some("budi".to_string()),
                class_label: Some("kelas 10".to_string()),
                month: None,
                year: Some("2025".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].nis, "2024001");

        // same text, wrong year: the conjunction fails
        let rows = infraction_report(
            &store,
            &ReportFilter {
                text: Some("budi".to_string()),
                class_label: None,
                month: None,
                year: Some("2024".to_string()),
            },
        )
        .await
        .unwrap();
        assert!(rows.is_empty());

        let rows = infraction_report(
            &store,
            &ReportFilter {
                text: None,
                class_label: None,
                month: Some("2024-11".to_string()),
                year: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student, "Citra Lestari");
    }

    #[tokio::test]
    async fn student_report_accumulates_points() {
        let store = seeded().await;
        let budi = infraction::lookup_student(&store, "2024001").await.unwrap();
        infraction::record_infraction(&store, budi.student.id, "Berkelahi", date(2025, 2, 10))
            .await
            .unwrap();
        infraction::record_infraction(
            &store,
            budi.student.id,
            "Vandalisme atau merusak fasilitas",
            date(2025, 2, 12),
        )
        .await
        .unwrap();

        let report = student_report(&store, "2024001").await.unwrap();
        assert_eq!(report.infractions.len(), 2);
        assert_eq!(report.profile.total_points, 35);
        // newest first
        assert_eq!(report.infractions[0].date, date(2025, 2, 12));

        assert!(matches!(
            student_report(&store, "0000").await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn dashboard_counts_tallies_and_balance() {
        let store = seeded().await;
        let teacher = registry::create_teacher(&store, "Ahmad Fauzi", Some("197805".to_string()))
            .await
            .unwrap();
        let subject = registry::create_subject(&store, "Matematika", teacher.id, ClassCode(1))
            .await
            .unwrap();

        let today = date(2025, 3, 10);
        let roster = registry::list_students(&store, Some(ClassCode(1))).await.unwrap();
        let students = store
            .list_students(StudentQuery {
                nis: None,
                class_code: Some(ClassCode(1)),
            })
            .await
            .unwrap();
        assert_eq!(roster.len(), students.len());
        let mut sheet = AttendanceSheet::prepare(students.iter().map(|s| s.id), today);
        for s in &students {
            sheet.set_status(s.id, AttendanceStatus::Present);
        }
        attendance::commit_student_session(
            &store,
            &sheet,
            &students,
            ClassSessionContext {
                teacher_id: teacher.id,
                subject_id: subject.id,
            },
        )
        .await
        .unwrap();

        ledger::record_income(
            &store,
            IncomeInput {
                date: Some(today),
                student: "Budi Santoso".to_string(),
                bill: Some(BillKind::Spp),
                month: Some(PaymentMonth::Maret),
                amount: None,
                note: None,
            },
        )
        .await
        .unwrap();
        ledger::record_expense(
            &store,
            ExpenseInput {
                date: Some(today),
                amount: Some(dec!(150000)),
                note: "Pembayaran Listrik".to_string(),
            },
        )
        .await
        .unwrap();

        let snapshot = dashboard_snapshot(&store, today).await.unwrap();
        assert_eq!(snapshot.students, 2);
        assert_eq!(snapshot.teachers, 1);
        assert_eq!(snapshot.subjects, 1);
        assert_eq!(snapshot.student_attendance.present, 1);
        assert_eq!(snapshot.teacher_attendance.total(), 0);
        assert_eq!(snapshot.balance, dec!(450000));
    }
}
