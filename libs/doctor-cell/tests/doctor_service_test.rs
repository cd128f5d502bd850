use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveTime;

use doctor_cell::models::{CreateDoctorRequest, DoctorError, DoctorStatus, UpdateDoctorRequest};
use doctor_cell::services::DoctorService;
use shared_database::MemoryStore;

fn service() -> DoctorService {
    DoctorService::new(Arc::new(MemoryStore::new()))
}

fn request(name: &str) -> CreateDoctorRequest {
    CreateDoctorRequest {
        name: name.to_string(),
        specialty: "General Medicine".to_string(),
        email: None,
        phone: None,
        available_from: None,
        available_to: None,
        consultation_fee: None,
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn create_applies_defaults() {
    let service = service();
    let doctor = service.create_doctor("clinic-1", request("Alok Shukla")).await.unwrap();

    assert_eq!(doctor.clinic_id, "clinic-1");
    assert_eq!(doctor.available_from, Some(hm(9, 0)));
    assert_eq!(doctor.available_to, Some(hm(17, 0)));
    assert_eq!(doctor.consultation_fee, 500.0);
    assert_eq!(doctor.status, DoctorStatus::Active);
}

#[tokio::test]
async fn create_requires_name_and_specialty() {
    let service = service();
    let mut req = request("  ");
    assert_matches!(service.create_doctor("clinic-1", req.clone()).await, Err(DoctorError::ValidationError(_)));

    req.name = "Riya Sen".to_string();
    req.specialty = String::new();
    assert_matches!(service.create_doctor("clinic-1", req).await, Err(DoctorError::ValidationError(_)));
}

#[tokio::test]
async fn create_rejects_overnight_hours() {
    let service = service();
    let mut req = request("Night Owl");
    req.available_from = Some("20:00".to_string());
    req.available_to = Some("04:00".to_string());

    assert_matches!(service.create_doctor("clinic-1", req).await, Err(DoctorError::ValidationError(_)));
}

#[tokio::test]
async fn update_validates_against_merged_hours() {
    let service = service();
    let doctor = service.create_doctor("clinic-1", request("Alok Shukla")).await.unwrap();

    let bad = UpdateDoctorRequest {
        available_from: Some("18:00".to_string()),
        ..Default::default()
    };
    assert_matches!(
        service.update_doctor("clinic-1", &doctor.id, bad).await,
        Err(DoctorError::ValidationError(_))
    );

    let good = UpdateDoctorRequest {
        available_to: Some("20:00".to_string()),
        ..Default::default()
    };
    let updated = service.update_doctor("clinic-1", &doctor.id, good).await.unwrap();
    assert_eq!(updated.available_from, Some(hm(9, 0)));
    assert_eq!(updated.available_to, Some(hm(20, 0)));
}

#[tokio::test]
async fn doctors_are_isolated_per_clinic() {
    let service = service();
    let doctor = service.create_doctor("clinic-1", request("Alok Shukla")).await.unwrap();

    assert_matches!(service.get_doctor("clinic-2", &doctor.id).await, Err(DoctorError::NotFound));
    assert_matches!(
        service.set_status("clinic-2", &doctor.id, DoctorStatus::Inactive).await,
        Err(DoctorError::NotFound)
    );
    assert!(service.list_doctors("clinic-2", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn active_only_listing_hides_disabled_doctors() {
    let service = service();
    let a = service.create_doctor("clinic-1", request("Zara Khan")).await.unwrap();
    service.create_doctor("clinic-1", request("Alok Shukla")).await.unwrap();
    service.set_status("clinic-1", &a.id, DoctorStatus::Inactive).await.unwrap();

    let all = service.list_doctors("clinic-1", false).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Alok Shukla");

    let active = service.list_doctors("clinic-1", true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Alok Shukla");
}

#[test]
fn working_hours_are_inclusive() {
    let doctor: doctor_cell::models::Doctor = serde_json::from_value(serde_json::json!({
        "id": "d1",
        "clinic_id": "c1",
        "name": "Alok Shukla",
        "specialty": "ENT",
        "available_from": "09:00",
        "available_to": "17:00",
        "consultation_fee": 500,
        "status": "active"
    }))
    .unwrap();

    assert!(doctor.works_at(hm(9, 0)));
    assert!(doctor.works_at(hm(17, 0)));
    assert!(!doctor.works_at(hm(8, 59)));
    assert!(!doctor.works_at(hm(17, 1)));
}
