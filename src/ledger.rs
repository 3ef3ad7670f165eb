use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{BillKind, ExpenseRecord, IncomeRecord, PaymentMonth, StudentId};
use crate::store::{IncomeQuery, NewExpense, NewIncome, RecordStore, StudentQuery};

/// Fixed expense descriptions offered by the expense form; "Lainnya"
/// takes free text.
pub const EXPENSE_NOTES: [&str; 8] = [
    "Pembelian ATK",
    "Pembayaran Listrik",
    "Pembayaran Air",
    "Pembayaran Internet",
    "Biaya Kegiatan",
    "Perbaikan Sarana",
    "Honor / Upah",
    "Lainnya",
];

#[derive(Debug, Clone, Deserialize)]
pub struct IncomeInput {
    pub date: Option<NaiveDate>,
    pub student: String,
    pub bill: Option<BillKind>,
    pub month: Option<PaymentMonth>,
    pub amount: Option<Decimal>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct IncomeReceipt {
    pub record: IncomeRecord,
    pub balance: Decimal,
}

#[derive(Debug, Clone)]
pub struct ExpenseReceipt {
    pub record: ExpenseRecord,
    pub balance: Decimal,
}

/// Income row with the student name projected in, as report screens
/// display it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IncomeRow {
    pub id: Uuid,
    pub date: NaiveDate,
    pub student: String,
    pub bill: String,
    pub month: Option<PaymentMonth>,
    pub amount: Decimal,
    pub note: Option<String>,
}

/// Conjunction of optional predicates; string matches are
/// case-insensitive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub text: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub bill: Option<String>,
}

pub async fn record_income(
    store: &dyn RecordStore,
    input: IncomeInput,
) -> Result<IncomeReceipt, CoreError> {
    let mut missing: Vec<&str> = Vec::new();
    if input.date.is_none() {
        missing.push("date");
    }
    if input.student.trim().is_empty() {
        missing.push("student");
    }
    match &input.bill {
        None => missing.push("bill"),
        Some(BillKind::Lainnya(label)) if label.trim().is_empty() => missing.push("bill"),
        _ => {}
    }
    if matches!(input.bill, Some(BillKind::Spp)) && input.month.is_none() {
        missing.push("month");
    }
    if matches!(input.bill, Some(BillKind::Lainnya(_))) && input.amount.is_none() {
        missing.push("amount");
    }
    if !missing.is_empty() {
        return Err(CoreError::missing_fields(&missing));
    }
    let Some(date) = input.date else {
        return Err(CoreError::missing_fields(&["date"]));
    };
    let Some(bill) = input.bill else {
        return Err(CoreError::missing_fields(&["bill"]));
    };

    let wanted = input.student.trim();
    let students = store.list_students(StudentQuery::default()).await?;
    let student = students
        .into_iter()
        .find(|s| s.name == wanted)
        .ok_or_else(|| CoreError::Validation(format!("student {wanted} is not registered")))?;

    let amount = match input.amount.or_else(|| bill.default_amount()) {
        Some(a) if a > Decimal::ZERO => a,
        Some(_) => return Err(CoreError::Validation("amount must be positive".to_string())),
        None => return Err(CoreError::missing_fields(&["amount"])),
    };

    // the month is only meaningful for SPP rows
    let month = if bill == BillKind::Spp {
        input.month
    } else {
        None
    };

    if let Some(month) = month {
        let existing = store
            .list_income(IncomeQuery {
                student_id: Some(student.id),
                bill: Some(bill.label().to_string()),
                month: Some(month),
            })
            .await?;
        if !existing.is_empty() {
            warn!(student = %student.name, %month, "duplicate SPP payment rejected");
            return Err(CoreError::DuplicatePayment {
                student: student.name,
                month,
            });
        }
    }

    let record = store
        .insert_income(NewIncome {
            date,
            student_id: student.id,
            bill: bill.label().to_string(),
            month,
            amount,
            note: input.note.filter(|n| !n.trim().is_empty()),
        })
        .await?;

    let balance = compute_balance(store).await?;
    if let Some(month) = month {
        // audit read-back of the guard predicate after the write
        let paid = store
            .list_income(IncomeQuery {
                student_id: Some(student.id),
                bill: Some(record.bill.clone()),
                month: Some(month),
            })
            .await?
            .len();
        info!(student = %student.name, %month, rows = paid, %balance, "SPP payment recorded");
    } else {
        info!(student = %student.name, bill = %record.bill, %amount, %balance, "income recorded");
    }
    Ok(IncomeReceipt { record, balance })
}

pub async fn record_expense(
    store: &dyn RecordStore,
    input: ExpenseInput,
) -> Result<ExpenseReceipt, CoreError> {
    let mut missing: Vec<&str> = Vec::new();
    if input.date.is_none() {
        missing.push("date");
    }
    if input.amount.is_none() {
        missing.push("amount");
    }
    if input.note.trim().is_empty() {
        missing.push("note");
    }
    if !missing.is_empty() {
        return Err(CoreError::missing_fields(&missing));
    }
    let (Some(date), Some(amount)) = (input.date, input.amount) else {
        return Err(CoreError::missing_fields(&["date", "amount"]));
    };
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".to_string()));
    }

    let record = store
        .insert_expense(NewExpense {
            date,
            amount,
            note: input.note.trim().to_string(),
        })
        .await?;
    let balance = compute_balance(store).await?;
    info!(note = %record.note, %amount, %balance, "expense recorded");
    Ok(ExpenseReceipt { record, balance })
}

/// Net cash position: sum of all income minus sum of all expense.
/// Always a fresh full scan; the result is a point-in-time snapshot.
pub async fn compute_balance(store: &dyn RecordStore) -> Result<Decimal, CoreError> {
    let income = store.list_income(IncomeQuery::default()).await?;
    let expense = store.list_expense().await?;
    let total_in: Decimal = income.iter().map(|r| r.amount).sum();
    let total_out: Decimal = expense.iter().map(|r| r.amount).sum();
    Ok(total_in - total_out)
}

/// Full fetch, then in-memory filtering; the store exposes get-all
/// with sort, not a predicate language.
pub async fn filter_income(
    store: &dyn RecordStore,
    filter: &TransactionFilter,
) -> Result<Vec<IncomeRow>, CoreError> {
    let records = store.list_income(IncomeQuery::default()).await?;
    let students = store.list_students(StudentQuery::default()).await?;
    let names: HashMap<StudentId, &str> =
        students.iter().map(|s| (s.id, s.name.as_str())).collect();
    let rows = records
        .into_iter()
        .map(|r| IncomeRow {
            id: r.id,
            date: r.date,
            student: names
                .get(&r.student_id)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            bill: r.bill,
            month: r.month,
            amount: r.amount,
            note: r.note,
        })
        .filter(|row| income_matches(row, filter))
        .collect();
    Ok(rows)
}

pub async fn filter_expense(
    store: &dyn RecordStore,
    filter: &TransactionFilter,
) -> Result<Vec<ExpenseRecord>, CoreError> {
    let records = store.list_expense().await?;
    Ok(records
        .into_iter()
        .filter(|r| expense_matches(r, filter))
        .collect())
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn income_matches(row: &IncomeRow, filter: &TransactionFilter) -> bool {
    let text_ok = match clean(filter.text.as_deref()) {
        None => true,
        Some(q) => {
            let q = q.to_lowercase();
            row.student.to_lowercase().contains(&q)
                || row.bill.to_lowercase().contains(&q)
                || row
                    .note
                    .as_deref()
                    .map_or(false, |n| n.to_lowercase().contains(&q))
        }
    };
    let month_ok = match clean(filter.month.as_deref()) {
        None => true,
        Some(m) => {
            row.date.format("%Y-%m").to_string() == m
                || row
                    .month
                    .map_or(false, |pm| pm.name().eq_ignore_ascii_case(m))
        }
    };
    let year_ok = match clean(filter.year.as_deref()) {
        None => true,
        Some(y) => row.date.format("%Y").to_string() == y,
    };
    let bill_ok = match clean(filter.bill.as_deref()) {
        None => true,
        Some(b) => row.bill.eq_ignore_ascii_case(b),
    };
    text_ok && month_ok && year_ok && bill_ok
}

fn expense_matches(record: &ExpenseRecord, filter: &TransactionFilter) -> bool {
    let text_ok = match clean(filter.text.as_deref()) {
        None => true,
        Some(q) => record.note.to_lowercase().contains(&q.to_lowercase()),
    };
    let month_ok = match clean(filter.month.as_deref()) {
        None => true,
        Some(m) => record.date.format("%Y-%m").to_string() == m,
    };
    let year_ok = match clean(filter.year.as_deref()) {
        None => true,
        Some(y) => record.date.format("%Y").to_string() == y,
    };
    text_ok && month_ok && year_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassCode, Student};
    use crate::registry;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded() -> (MemoryStore, Student) {
        let store = MemoryStore::new();
        registry::create_class(&store, "Kelas 10").await.unwrap();
        let student = registry::create_student(
            &store,
            registry::NewStudentInput {
                name: "Budi Santoso".to_string(),
                nis: "2024001".to_string(),
                class_code: Some(ClassCode(1)),
            },
        )
        .await
        .unwrap();
        (store, student)
    }

    fn spp_input(student: &str, month: PaymentMonth) -> IncomeInput {
        IncomeInput {
            date: Some(date(2025, 1, 10)),
            student: student.to_string(),
            bill: Some(BillKind::Spp),
            month: Some(month),
            amount: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn missing_fields_are_named_and_nothing_is_written() {
        let (store, _) = seeded().await;
        let err = record_income(
            &store,
            IncomeInput {
                date: None,
                student: String::new(),
                bill: None,
                month: None,
                amount: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
        match err {
            CoreError::Validation(msg) => {
                assert!(msg.contains("date"), "{msg}");
                assert!(msg.contains("student"), "{msg}");
                assert!(msg.contains("bill"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store
            .list_income(IncomeQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn spp_without_month_is_rejected() {
        let (store, _) = seeded().await;
        let mut input = spp_input("Budi Santoso", PaymentMonth::Januari);
        input.month = None;
        let err = record_income(&store, input).await.unwrap_err();
        match err {
            CoreError::Validation(msg) => assert!(msg.contains("month"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn spp_amount_defaults_to_tariff() {
        let (store, _) = seeded().await;
        let receipt = record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap();
        assert_eq!(receipt.record.amount, dec!(600000));
        assert_eq!(receipt.balance, dec!(600000));
    }

    #[tokio::test]
    async fn second_spp_for_same_month_is_rejected_with_no_new_row() {
        let (store, _) = seeded().await;
        record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap();
        let err = record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap_err();
        match err {
            CoreError::DuplicatePayment { student, month } => {
                assert_eq!(student, "Budi Santoso");
                assert_eq!(month, PaymentMonth::Januari);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            store.list_income(IncomeQuery::default()).await.unwrap().len(),
            1
        );
        // a different month is fine
        record_income(&store, spp_input("Budi Santoso", PaymentMonth::Februari))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unregistered_student_is_rejected() {
        let (store, _) = seeded().await;
        let err = record_income(&store, spp_input("Tono", PaymentMonth::Januari))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let (store, _) = seeded().await;
        let err = record_income(
            &store,
            IncomeInput {
                date: Some(date(2025, 3, 1)),
                student: "Budi Santoso".to_string(),
                bill: Some(BillKind::Lainnya("Seragam".to_string())),
                month: None,
                amount: Some(dec!(-5000)),
                note: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn balance_is_income_minus_expense_regardless_of_order() {
        let (store, _) = seeded().await;
        record_expense(
            &store,
            ExpenseInput {
                date: Some(date(2025, 1, 5)),
                amount: Some(dec!(75000)),
                note: "Pembelian ATK".to_string(),
            },
        )
        .await
        .unwrap();
        record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap();
        let receipt = record_expense(
            &store,
            ExpenseInput {
                date: Some(date(2025, 1, 20)),
                amount: Some(dec!(125000)),
                note: "Pembayaran Listrik".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(receipt.balance, dec!(400000));
        assert_eq!(compute_balance(&store).await.unwrap(), dec!(400000));
    }

    #[tokio::test]
    async fn expense_requires_note_and_positive_amount() {
        let (store, _) = seeded().await;
        let err = record_expense(
            &store,
            ExpenseInput {
                date: Some(date(2025, 1, 5)),
                amount: Some(dec!(10000)),
                note: "  ".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = record_expense(
            &store,
            ExpenseInput {
                date: Some(date(2025, 1, 5)),
                amount: Some(Decimal::ZERO),
                note: "Biaya Kegiatan".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(store.list_expense().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filters_apply_as_a_case_insensitive_conjunction() {
        let (store, _) = seeded().await;
        record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap();
        let mut old = spp_input("Budi Santoso", PaymentMonth::Desember);
        old.date = Some(date(2024, 12, 20));
        record_income(&store, old).await.unwrap();
        record_income(
            &store,
            IncomeInput {
                date: Some(date(2024, 7, 1)),
                student: "Budi Santoso".to_string(),
                bill: Some(BillKind::Kalender),
                month: None,
                amount: None,
                note: Some("kalender tahunan".to_string()),
            },
        )
        .await
        .unwrap();

        let rows = filter_income(
            &store,
            &TransactionFilter {
                text: None,
                month: None,
                year: Some("2024".to_string()),
                bill: Some("spp".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bill, "SPP");
        assert_eq!(rows[0].date, date(2024, 12, 20));

        // free text hits the note as well
        let rows = filter_income(
            &store,
            &TransactionFilter {
                text: Some("TAHUNAN".to_string()),
                month: None,
                year: None,
                bill: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bill, "Kalender");

        // month filter matches either the date slice or the SPP month label
        let rows = filter_income(
            &store,
            &TransactionFilter {
                text: None,
                month: Some("Desember".to_string()),
                year: None,
                bill: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        let rows = filter_income(
            &store,
            &TransactionFilter {
                text: None,
                month: Some("2024-07".to_string()),
                year: None,
                bill: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn income_rows_project_the_student_name() {
        let (store, student) = seeded().await;
        record_income(&store, spp_input("Budi Santoso", PaymentMonth::Januari))
            .await
            .unwrap();
        let rows = filter_income(&store, &TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(rows[0].student, "Budi Santoso");

        // orphaned reference falls back to "-"
        store.delete_student(student.id).await.unwrap();
        let rows = filter_income(&store, &TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(rows[0].student, "-");
    }
}
