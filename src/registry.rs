use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::error::CoreError;
use crate::model::{ClassCode, ClassRoom, Student, StudentId, Subject, SubjectId, Teacher, TeacherId};
use crate::store::{
    NewClassRoom, NewStudent, NewSubject, NewTeacher, RecordStore, StoreError, StudentQuery,
    StudentUpdate, TeacherUpdate,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudentInput {
    pub name: String,
    pub nis: String,
    pub class_code: Option<ClassCode>,
}

/// Student row with the class label projected in, as the admin list
/// displays it.
#[derive(Debug, Clone, Serialize)]
pub struct StudentRow {
    pub id: StudentId,
    pub nis: String,
    pub name: String,
    pub class_code: ClassCode,
    pub class_label: String,
}

fn missing<T>(result: Result<T, StoreError>, what: String) -> Result<T, CoreError> {
    match result {
        Err(StoreError::RowNotFound) => Err(CoreError::NotFound(what)),
        other => other.map_err(CoreError::Store),
    }
}

/// Resolves a class by its external sequence code. The internal row id
/// is never used as a join key.
pub async fn resolve_class(
    store: &dyn RecordStore,
    code: ClassCode,
) -> Result<ClassRoom, CoreError> {
    let classes = store.list_classes().await?;
    classes
        .into_iter()
        .find(|c| c.code == code)
        .ok_or_else(|| CoreError::NotFound(format!("class {code}")))
}

async fn validate_student_input(
    store: &dyn RecordStore,
    input: &NewStudentInput,
    existing_id: Option<StudentId>,
) -> Result<(String, String, ClassCode), CoreError> {
    let mut fields: Vec<&str> = Vec::new();
    if input.name.trim().is_empty() {
        fields.push("name");
    }
    if input.nis.trim().is_empty() {
        fields.push("nis");
    }
    if input.class_code.is_none() {
        fields.push("class");
    }
    if !fields.is_empty() {
        return Err(CoreError::missing_fields(&fields));
    }
    let Some(class_code) = input.class_code else {
        return Err(CoreError::missing_fields(&["class"]));
    };
    match resolve_class(store, class_code).await {
        Ok(_) => {}
        Err(CoreError::NotFound(_)) => {
            return Err(CoreError::Validation(format!(
                "class {class_code} does not exist"
            )))
        }
        Err(other) => return Err(other),
    }

    // the store only enforces uniqueness where the schema declares it,
    // so the nis check lives here
    let nis = input.nis.trim().to_string();
    let taken = store
        .list_students(StudentQuery {
            nis: Some(nis.clone()),
            class_code: None,
        })
        .await?;
    if taken.iter().any(|s| Some(s.id) != existing_id) {
        return Err(CoreError::Validation(format!(
            "nis {nis} is already registered"
        )));
    }
    Ok((input.name.trim().to_string(), nis, class_code))
}

pub async fn create_student(
    store: &dyn RecordStore,
    input: NewStudentInput,
) -> Result<Student, CoreError> {
    let (name, nis, class_code) = validate_student_input(store, &input, None).await?;
    let student = store
        .insert_student(NewStudent {
            nis,
            name,
            class_code,
        })
        .await?;
    info!(id = student.id, nis = %student.nis, "student registered");
    Ok(student)
}

pub async fn update_student(
    store: &dyn RecordStore,
    id: StudentId,
    input: NewStudentInput,
) -> Result<Student, CoreError> {
    let (name, nis, class_code) = validate_student_input(store, &input, Some(id)).await?;
    missing(
        store
            .update_student(
                id,
                StudentUpdate {
                    nis,
                    name,
                    class_code,
                },
            )
            .await,
        format!("student {id}"),
    )
}

pub async fn delete_student(store: &dyn RecordStore, id: StudentId) -> Result<(), CoreError> {
    // non-cascading: historical attendance/payment/infraction rows are
    // orphaned and read paths fall back to "-"
    missing(store.delete_student(id).await, format!("student {id}"))
}

pub async fn list_students(
    store: &dyn RecordStore,
    class: Option<ClassCode>,
) -> Result<Vec<StudentRow>, CoreError> {
    let students = store
        .list_students(StudentQuery {
            nis: None,
            class_code: class,
        })
        .await?;
    let classes = store.list_classes().await?;
    let labels: HashMap<ClassCode, &str> =
        classes.iter().map(|c| (c.code, c.label.as_str())).collect();
    Ok(students
        .into_iter()
        .map(|s| StudentRow {
            id: s.id,
            nis: s.nis,
            name: s.name,
            class_code: s.class_code,
            class_label: labels
                .get(&s.class_code)
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect())
}

pub async fn create_teacher(
    store: &dyn RecordStore,
    name: &str,
    nip: Option<String>,
) -> Result<Teacher, CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::missing_fields(&["name"]));
    }
    let teacher = store
        .insert_teacher(NewTeacher {
            name: name.trim().to_string(),
            nip: nip.filter(|n| !n.trim().is_empty()),
        })
        .await?;
    info!(id = teacher.id, "teacher registered");
    Ok(teacher)
}

pub async fn update_teacher(
    store: &dyn RecordStore,
    id: TeacherId,
    name: &str,
    nip: Option<String>,
) -> Result<Teacher, CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::missing_fields(&["name"]));
    }
    missing(
        store
            .update_teacher(
                id,
                TeacherUpdate {
                    name: name.trim().to_string(),
                    nip: nip.filter(|n| !n.trim().is_empty()),
                },
            )
            .await,
        format!("teacher {id}"),
    )
}

pub async fn delete_teacher(store: &dyn RecordStore, id: TeacherId) -> Result<(), CoreError> {
    missing(store.delete_teacher(id).await, format!("teacher {id}"))
}

pub async fn list_teachers(store: &dyn RecordStore) -> Result<Vec<Teacher>, CoreError> {
    Ok(store.list_teachers().await?)
}

/// Creates a class under the next free sequence code; the code is
/// immutable once assigned.
pub async fn create_class(store: &dyn RecordStore, label: &str) -> Result<ClassRoom, CoreError> {
    if label.trim().is_empty() {
        return Err(CoreError::missing_fields(&["label"]));
    }
    let classes = store.list_classes().await?;
    let next = classes.last().map(|c| c.code.0 + 1).unwrap_or(1);
    let class = store
        .insert_class(NewClassRoom {
            code: ClassCode(next),
            label: label.trim().to_string(),
        })
        .await?;
    info!(code = %class.code, label = %class.label, "class created");
    Ok(class)
}

pub async fn update_class(
    store: &dyn RecordStore,
    id: i64,
    label: &str,
) -> Result<ClassRoom, CoreError> {
    if label.trim().is_empty() {
        return Err(CoreError::missing_fields(&["label"]));
    }
    missing(
        store.update_class(id, label.trim().to_string()).await,
        format!("class {id}"),
    )
}

pub async fn delete_class(store: &dyn RecordStore, id: i64) -> Result<(), CoreError> {
    missing(store.delete_class(id).await, format!("class {id}"))
}

pub async fn list_classes(store: &dyn RecordStore) -> Result<Vec<ClassRoom>, CoreError> {
    Ok(store.list_classes().await?)
}

pub async fn create_subject(
    store: &dyn RecordStore,
    name: &str,
    teacher_id: TeacherId,
    class_code: ClassCode,
) -> Result<Subject, CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::missing_fields(&["name"]));
    }
    let teachers = store.list_teachers().await?;
    if !teachers.iter().any(|t| t.id == teacher_id) {
        return Err(CoreError::Validation(format!(
            "teacher {teacher_id} does not exist"
        )));
    }
    match resolve_class(store, class_code).await {
        Ok(_) => {}
        Err(CoreError::NotFound(_)) => {
            return Err(CoreError::Validation(format!(
                "class {class_code} does not exist"
            )))
        }
        Err(other) => return Err(other),
    }
    let subject = store
        .insert_subject(NewSubject {
            name: name.trim().to_string(),
            teacher_id,
            class_code,
        })
        .await?;
    info!(id = subject.id, name = %subject.name, "subject created");
    Ok(subject)
}

pub async fn delete_subject(store: &dyn RecordStore, id: SubjectId) -> Result<(), CoreError> {
    missing(store.delete_subject(id).await, format!("subject {id}"))
}

pub async fn list_subjects(
    store: &dyn RecordStore,
    class: Option<ClassCode>,
) -> Result<Vec<Subject>, CoreError> {
    Ok(store.list_subjects(class).await?)
}
