use chrono::NaiveDate;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::error::CoreError;
use crate::model::{Student, StudentId};
use crate::store::{NewInfraction, RecordStore, StudentQuery};

#[derive(Debug, Clone, Copy)]
pub struct ScheduleEntry {
    pub tier: &'static str,
    pub description: &'static str,
    pub points: i32,
}

/// The fixed infraction schedule. Points are always taken from here,
/// never entered by hand.
pub const POINT_SCHEDULE: &[ScheduleEntry] = &[
    ScheduleEntry { tier: "Tingkat 1", description: "Terlambat datang ke kelas / madrasah 1 – 15 menit", points: 2 },
    ScheduleEntry { tier: "Tingkat 1", description: "Tidak memakai atribut pada seragam sekolah", points: 2 },
    ScheduleEntry { tier: "Tingkat 1", description: "Berpenampilan tidak sopan dan tidak islami, berdandan tidak rapi, seperti berambut panjang (khusus pria), makeup berlebihan, berpakaian ketat di madrasah", points: 2 },
    ScheduleEntry { tier: "Tingkat 1", description: "Terlambat datang ke kelas / madrasah 15 – 30 menit", points: 4 },
    ScheduleEntry { tier: "Tingkat 2", description: "Siswa yang terlambat lebih dari 30 menit", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Tidak memakai seragam yang telah ditentukan", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Tidak mengikuti apel/baris dengan alasan yang tidak jelas", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Memasuki area madrasah tidak melalui gerbang utama", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Membuat keributan atau kegaduhan di dalam kelas sehingga mengganggu suasana belajar", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Tidak mengikuti shalat Zuhur berjamaah di mushalla madrasah", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Memindahkan dan mengubah alat – alat laboratorium atau madrasah yang telah terpasang tanpa izin", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Menggunakan fasilitas madrasah tidak pada waktunya", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Meninggalkan pelajaran tanpa alasan yang jelas", points: 5 },
    ScheduleEntry { tier: "Tingkat 2", description: "Mengkonsumsi rokok / vape saat memakai seragam", points: 5 },
    ScheduleEntry { tier: "Tingkat 3", description: "Mengadakan kegiatan dengan orang luar tanpa izin", points: 10 },
    ScheduleEntry { tier: "Tingkat 3", description: "Vandalisme atau merusak fasilitas", points: 10 },
    ScheduleEntry { tier: "Tingkat 3", description: "Menggunakan barang bukan milik sendiri tanpa izin", points: 10 },
    ScheduleEntry { tier: "Tingkat 3", description: "Membawa barang elektronik yang dilarang (speaker, iPod, dsb)", points: 10 },
    ScheduleEntry { tier: "Tingkat 3", description: "Melakukan bullying sesama teman", points: 15 },
    ScheduleEntry { tier: "Tingkat 4", description: "Bullying guru atau karyawan", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Merokok/vape di lingkungan madrasah", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Berkelahi", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Mengancam secara lisan/tulisan", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Membawa konten pornografi", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Berduaan dengan bukan mahram secara mencurigakan", points: 25 },
    ScheduleEntry { tier: "Tingkat 4", description: "Chat mengandung unsur asusila", points: 50 },
    ScheduleEntry { tier: "Tingkat 5", description: "Menyebarkan konten pornografi", points: 75 },
    ScheduleEntry { tier: "Tingkat 5", description: "Memalsukan tanda tangan atau dokumen resmi", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Menggunakan/membawa narkoba, alkohol, atau barang terlarang", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Melakukan tindakan asusila", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Membawa senjata tajam/berbahaya", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Berjudi atau mabuk-mabukan", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Melakukan tindak pidana", points: 100 },
    ScheduleEntry { tier: "Tingkat 5", description: "Menyebarkan ajaran yang menyimpang", points: 100 },
];

pub fn schedule_points(description: &str) -> Option<i32> {
    POINT_SCHEDULE
        .iter()
        .find(|e| e.description == description)
        .map(|e| e.points)
}

#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub student: Student,
    pub class_label: String,
    pub total_points: i32,
}

pub async fn lookup_student(
    store: &dyn RecordStore,
    nis: &str,
) -> Result<StudentProfile, CoreError> {
    let nis = nis.trim();
    let found = store
        .list_students(StudentQuery {
            nis: Some(nis.to_string()),
            class_code: None,
        })
        .await?;
    let student = found
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::NotFound(format!("student with nis {nis}")))?;
    let classes = store.list_classes().await?;
    let class_label = classes
        .iter()
        .find(|c| c.code == student.class_code)
        .map(|c| c.label.clone())
        .unwrap_or_else(|| student.class_code.to_string());
    let total_points = total_points(store, student.id).await?;
    Ok(StudentProfile {
        student,
        class_label,
        total_points,
    })
}

/// Supersede-on-new-input gate for the debounced nis lookup. Each call
/// takes the next sequence token when the future is created; a result
/// is applied only if no newer call has started by the time it
/// resolves, so a stale response can never overwrite a fresh one.
#[derive(Debug, Default)]
pub struct NisLookup {
    seq: AtomicU64,
}

impl NisLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == token
    }

    /// Ok(None) means the response was superseded and must be
    /// discarded, whatever it was.
    pub fn resolve<'a>(
        &'a self,
        store: &'a dyn RecordStore,
        nis: &'a str,
    ) -> impl Future<Output = Result<Option<StudentProfile>, CoreError>> + 'a {
        let token = self.begin();
        async move {
            let result = lookup_student(store, nis).await;
            if !self.is_current(token) {
                return Ok(None);
            }
            result.map(Some)
        }
    }
}

/// Writes one infraction row with the scheduled point value and
/// returns the student's re-summed running total.
pub async fn record_infraction(
    store: &dyn RecordStore,
    student_id: StudentId,
    description: &str,
    date: NaiveDate,
) -> Result<i32, CoreError> {
    let points = schedule_points(description)
        .ok_or_else(|| CoreError::Validation(format!("unknown infraction: {description}")))?;
    store
        .insert_infraction(NewInfraction {
            student_id,
            description: description.to_string(),
            points,
            date,
        })
        .await?;
    let total = total_points(store, student_id).await?;
    info!(student_id, points, total, "infraction recorded");
    Ok(total)
}

/// Full re-aggregation on every call; no counter is maintained.
pub async fn total_points(
    store: &dyn RecordStore,
    student_id: StudentId,
) -> Result<i32, CoreError> {
    let rows = store.list_infractions(Some(student_id)).await?;
    Ok(rows.iter().map(|r| r.points).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassCode;
    use crate::registry;
    use crate::store::MemoryStore;

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

    #[test]
    fn schedule_spans_five_tiers_from_2_to_100() {
        assert_eq!(
            schedule_points("Tidak memakai atribut pada seragam sekolah"),
            Some(2)
        );
        assert_eq!(schedule_points("Melakukan tindak pidana"), Some(100));
        assert_eq!(schedule_points("Mengunyah permen karet"), None);
        let tiers: std::collections::BTreeSet<&str> =
            POINT_SCHEDULE.iter().map(|e| e.tier).collect();
        assert_eq!(tiers.len(), 5);
    }

    #[tokio::test]
    async fn unknown_description_is_rejected() {
        let (store, student) = seeded().await;
        let err = record_infraction(&store, student.id, "Mengunyah permen karet", date(2025, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(total_points(&store, student.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn totals_are_idempotent_and_grow_by_the_scheduled_points() {
        let (store, student) = seeded().await;
        record_infraction(&store, student.id, "Berkelahi", date(2025, 2, 1))
            .await
            .unwrap();
        let first = total_points(&store, student.id).await.unwrap();
        let second = total_points(&store, student.id).await.unwrap();
        assert_eq!(first, 25);
        assert_eq!(first, second);

        // a 5-point entry bumps the total by exactly 5
        let total = record_infraction(
            &store,
            student.id,
            "Siswa yang terlambat lebih dari 30 menit",
            date(2025, 2, 2),
        )
        .await
        .unwrap();
        assert_eq!(total, first + 5);
    }

    #[tokio::test]
    async fn lookup_resolves_profile_or_not_found() {
        let (store, student) = seeded().await;
        record_infraction(&store, student.id, "Berkelahi", date(2025, 2, 1))
            .await
            .unwrap();

        let profile = lookup_student(&store, " 2024001 ").await.unwrap();
        assert_eq!(profile.student.id, student.id);
        assert_eq!(profile.class_label, "Kelas 10");
        assert_eq!(profile.total_points, 25);

        let err = lookup_student(&store, "9999").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn superseded_lookup_is_discarded() {
        let (store, _) = seeded().await;
        let lookup = NisLookup::new();

        // the second keystroke arrives while the first is in flight
        let stale = lookup.resolve(&store, "2024001");
        let fresh = lookup.resolve(&store, "2024001");
        assert!(stale.await.unwrap().is_none());
        assert!(fresh.await.unwrap().is_some());

        // even a failure is swallowed once superseded
        let stale = lookup.resolve(&store, "9999");
        let _fresh = lookup.begin();
        assert!(stale.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_ordering_tracks_the_latest_call() {
        let lookup = NisLookup::new();
        let t1 = lookup.begin();
        let t2 = lookup.begin();
        assert!(!lookup.is_current(t1));
        assert!(lookup.is_current(t2));
    }
}
