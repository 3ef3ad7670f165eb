use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::attendance::{self, AttendanceSheet, ClassSessionContext};
use crate::error::CoreError;
use crate::infraction;
use crate::ledger::{self, ExpenseInput, IncomeInput};
use crate::model::{AttendanceStatus, BillKind, ClassCode, PaymentMonth};
use crate::registry::{self, NewStudentInput};
use crate::store::{MemoryStore, RecordStore, StudentQuery};

/// Builds a populated in-memory store through the public operations:
/// three classes, two teachers, six students, a day of attendance and
/// a handful of ledger entries.
pub async fn demo_store() -> Result<MemoryStore, CoreError> {
    let store = MemoryStore::new();

    registry::create_class(&store, "Kelas 10").await?;
    registry::create_class(&store, "Kelas 11").await?;
    registry::create_class(&store, "Kelas 12").await?;

    let fauzi = registry::create_teacher(&store, "Ahmad Fauzi", Some("197805112005011003".to_string())).await?;
    let rahma = registry::create_teacher(&store, "Siti Rahma", None).await?;

    let matematika = registry::create_subject(&store, "Matematika", fauzi.id, ClassCode(1)).await?;
    registry::create_subject(&store, "Bahasa Indonesia", rahma.id, ClassCode(1)).await?;
    registry::create_subject(&store, "Fisika", fauzi.id, ClassCode(2)).await?;

    for (nis, name, class) in [
        ("2024001", "Budi Santoso", 1),
        ("2024002", "Citra Lestari", 1),
        ("2024003", "Dewi Anggraini", 1),
        ("2023010", "Eko Prasetyo", 2),
        ("2023011", "Fitri Handayani", 2),
        ("2022005", "Gilang Ramadhan", 3),
    ] {
        registry::create_student(
            &store,
            NewStudentInput {
                name: name.to_string(),
                nis: nis.to_string(),
                class_code: Some(ClassCode(class)),
            },
        )
        .await?;
    }

    let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap_or_default();
    let roster = store
        .list_students(StudentQuery {
            nis: None,
            class_code: Some(ClassCode(1)),
        })
        .await?;
    let mut sheet = AttendanceSheet::prepare(roster.iter().map(|s| s.id), today);
    for (i, member) in roster.iter().enumerate() {
        let status = if i == 0 {
            AttendanceStatus::Sick
        } else {
            AttendanceStatus::Present
        };
        sheet.set_status(member.id, status);
    }
    attendance::commit_student_session(
        &store,
        &sheet,
        &roster,
        ClassSessionContext {
            teacher_id: fauzi.id,
            subject_id: matematika.id,
        },
    )
    .await?;

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
    .await?;
    ledger::record_income(
        &store,
        IncomeInput {
            date: Some(today),
            student: "Eko Prasetyo".to_string(),
            bill: Some(BillKind::BukuKelas11),
            month: None,
            amount: None,
            note: Some("paket buku semester genap".to_string()),
        },
    )
    .await?;
    ledger::record_expense(
        &store,
        ExpenseInput {
            date: Some(today),
            amount: Some(Decimal::from(250_000)),
            note: "Pembelian ATK".to_string(),
        },
    )
    .await?;

    let budi = infraction::lookup_student(&store, "2024001").await?;
    infraction::record_infraction(
        &store,
        budi.student.id,
        "Terlambat datang ke kelas / madrasah 1 – 15 menit",
        today,
    )
    .await?;

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn demo_store_is_internally_consistent() {
        let store = demo_store().await.unwrap();
        let snapshot = report::dashboard_snapshot(
            &store,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(snapshot.students, 6);
        assert_eq!(snapshot.teachers, 2);
        assert_eq!(snapshot.subjects, 3);
        assert_eq!(snapshot.student_attendance.total(), 3);
        assert_eq!(snapshot.student_attendance.sick, 1);
        assert_eq!(snapshot.balance, dec!(600000) + dec!(731000) - dec!(250000));

        let budi = infraction::lookup_student(&store, "2024001").await.unwrap();
        assert_eq!(budi.total_points, 2);
    }
}
