use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use clinic_cell::{clinic_routes, public_clinic_routes, ClinicError, ClinicService, RegisterClinicRequest, UpdateClinicRequest};
use shared_database::{tables, MemoryStore, Store};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn register(name: &str, slug: Option<&str>) -> RegisterClinicRequest {
    RegisterClinicRequest {
        name: name.to_string(),
        slug: slug.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn registration_normalises_slug_from_name() {
    let service = ClinicService::new(Arc::new(MemoryStore::new()));
    let clinic = service.register_clinic("user-1", register("Sunrise Clinic", None)).await.unwrap();

    assert_eq!(clinic.slug, "sunrise-clinic");
    assert_eq!(clinic.owner_user_id, "user-1");
    assert_eq!(service.get_by_slug("Sunrise Clinic").await.unwrap().id, clinic.id);
}

#[tokio::test]
async fn one_clinic_per_owner_and_unique_slugs() {
    let service = ClinicService::new(Arc::new(MemoryStore::new()));
    service.register_clinic("user-1", register("Sunrise", Some("sunrise"))).await.unwrap();

    assert_matches!(
        service.register_clinic("user-1", register("Second", Some("second"))).await,
        Err(ClinicError::AlreadyRegistered)
    );
    assert_matches!(
        service.register_clinic("user-2", register("Other", Some("SUNRISE"))).await,
        Err(ClinicError::SlugTaken { .. })
    );
    assert_matches!(
        service.register_clinic("user-3", register("  ", None)).await,
        Err(ClinicError::ValidationError(_))
    );
}

#[tokio::test]
async fn update_keeps_slug() {
    let service = ClinicService::new(Arc::new(MemoryStore::new()));
    let clinic = service.register_clinic("user-1", register("Sunrise", None)).await.unwrap();

    let updated = service
        .update_clinic(&clinic.id, UpdateClinicRequest {
            name: Some("Sunrise Family Clinic".to_string()),
            phone: Some("080-1234".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.name, "Sunrise Family Clinic");
    assert_eq!(updated.slug, "sunrise");
    assert_eq!(updated.phone.as_deref(), Some("080-1234"));
}

#[tokio::test]
async fn public_directory_counts_active_doctors() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = ClinicService::new(store.clone());
    let a = service.register_clinic("user-1", register("Alpha", None)).await.unwrap();
    service.register_clinic("user-2", register("Beta", None)).await.unwrap();

    for (name, status) in [("A", "active"), ("B", "active"), ("C", "inactive")] {
        store
            .insert(tables::DOCTORS, json!({"clinic_id": a.id, "name": name, "specialty": "GP", "status": status}))
            .await
            .unwrap();
    }

    let clinics = service.list_public().await.unwrap();
    assert_eq!(clinics.len(), 2);
    assert_eq!(clinics[0].name, "Alpha");
    assert_eq!(clinics[0].doctor_count, Some(2));
    assert_eq!(clinics[1].doctor_count, Some(0));

    let (profile, doctors) = service.public_profile("alpha").await.unwrap();
    assert_eq!(profile.id, a.id);
    assert_eq!(doctors.len(), 2);
}

#[tokio::test]
async fn register_then_fetch_over_http() {
    let config = TestConfig::default();
    let user = TestUser::default();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service = Arc::new(ClinicService::new(store.clone()));
    let router = clinic_routes(config.to_arc(), store, service.clone());
    let bearer = JwtTestUtils::bearer(&user, &config);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/me")
                .header("Authorization", &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", &bearer)
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"name": "Sunrise Clinic"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/me")
                .header("Authorization", &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["slug"], "sunrise-clinic");

    let response = public_clinic_routes(service)
        .oneshot(Request::builder().uri("/unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
