mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::harness;
use serde_json::json;
use workshop_contracts::Role;

#[tokio::test]
async fn repairs_listing_pages_over_twenty_three_items() {
    let h = harness();
    h.seed_repairs(23).await;
    let token = h.token(&h.user("ann", Role::User).await);

    let page1 = h.get_as("/api/repairs?page=1", &token).await;
    assert_eq!(page1.status, StatusCode::OK);
    let body = page1.json();
    assert_eq!(body["repairs"].as_array().map(Vec::len), Some(10));
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["totalItems"], 23);
    assert_eq!(body["repairs"][0]["id"], 1);
    assert_eq!(body["repairs"][0]["type"], "phone");

    let page3 = h.get_as("/api/repairs?page=3", &token).await.json();
    let ids = page3["repairs"]
        .as_array()
        .expect("array")
        .iter()
        .map(|r| r["id"].as_i64().expect("id"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![21, 22, 23]);

    let page4 = h.get_as("/api/repairs?page=4", &token).await.json();
    assert_eq!(page4["repairs"], json!([]));
    assert_eq!(page4["currentPage"], 4);
    assert_eq!(page4["totalPages"], 3);

    let again = h.get_as("/api/repairs?page=3", &token).await.json();
    assert_eq!(page3, again);
}

#[tokio::test]
async fn unusable_page_values_fall_back_to_first_page() {
    let h = harness();
    h.seed_repairs(12).await;
    let token = h.token(&h.user("ann", Role::User).await);

    for uri in [
        "/api/repairs",
        "/api/repairs?page=",
        "/api/repairs?page=abc",
        "/api/repairs?page=0",
        "/api/repairs?page=-3",
        "/api/repairs?page=2&page=3",
        "/api/repairs?page=%FF",
    ] {
        let reply = h.get_as(uri, &token).await;
        assert_eq!(reply.status, StatusCode::OK, "{uri}");
        let body = reply.json();
        assert_eq!(body["currentPage"], 1, "{uri}");
        assert_eq!(body["repairs"].as_array().map(Vec::len), Some(10), "{uri}");
    }

    let huge = h
        .get_as("/api/repairs?page=99999999999999999999999", &token)
        .await;
    assert_eq!(huge.status, StatusCode::OK);
    assert_eq!(huge.json()["repairs"], json!([]));
}

#[tokio::test]
async fn empty_collection_has_zero_pages() {
    let h = harness();
    let token = h.token(&h.user("ann", Role::User).await);

    let body = h.get_as("/api/jewelry", &token).await.json();
    assert_eq!(
        body,
        json!({"jewelry": [], "currentPage": 1, "totalPages": 0, "totalItems": 0})
    );
}

#[tokio::test]
async fn listing_store_outage_is_a_generic_500() {
    let h = harness();
    h.seed_repairs(5).await;
    let token = h.token(&h.user("ann", Role::User).await);
    h.repairs.set_unavailable(true);

    let reply = h.get_as("/api/repairs", &token).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        json!({"code": "ERR_INTERNAL", "message": "internal server error"})
    );
}

#[tokio::test]
async fn repair_crud_round() {
    let h = harness();
    let token = h.token(&h.user("ann", Role::User).await);

    let created = h
        .send_json_as(
            "POST",
            "/api/repairs",
            &token,
            json!({
                "client_name": " Ivan ",
                "type": "laptop",
                "brand": "Acme",
                "model": "X1",
                "issue_description": "no power",
                "repair_cost": 120.5,
                "photo": "/img/repairs/old.png"
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["client_name"], "Ivan");
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["photo"], "/images/repairs/old.png");
    let id = body["id"].as_i64().expect("id");

    let viewed = h.get_as(&format!("/api/repairs/{id}"), &token).await;
    assert_eq!(viewed.status, StatusCode::OK);
    assert_eq!(viewed.json()["model"], "X1");

    let updated = h
        .send_json_as(
            "PUT",
            &format!("/api/repairs/{id}"),
            &token,
            json!({
                "client_name": "Ivan",
                "type": "laptop",
                "brand": "Acme",
                "model": "X1",
                "issue_description": "no power",
                "repair_cost": 99,
                "status": "completed"
            }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["status"], "completed");

    let missing = h
        .send_json_as(
            "PUT",
            "/api/repairs/999",
            &token,
            json!({
                "client_name": "Ivan",
                "type": "laptop",
                "brand": "Acme",
                "model": "X1",
                "issue_description": "no power",
                "repair_cost": 1
            }),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.json()["message"], "repair not found");
}

#[tokio::test]
async fn invalid_bodies_and_ids_are_rejected() {
    let h = harness();
    let token = h.token(&h.user("ann", Role::User).await);

    let blank = h
        .send_json_as(
            "POST",
            "/api/repairs",
            &token,
            json!({
                "client_name": "",
                "type": "laptop",
                "brand": "Acme",
                "model": "X1",
                "issue_description": "no power",
                "repair_cost": 1
            }),
        )
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.json()["message"], "missing required field: client_name");

    let negative = h
        .send_json_as(
            "POST",
            "/api/smartwatches",
            &token,
            json!({
                "brand": "Acme",
                "model": "W",
                "color": "black",
                "display_type": "OLED",
                "battery_life": 24,
                "price": -1
            }),
        )
        .await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);

    let unknown_field = h
        .send_json_as("POST", "/api/orders", &token, json!({"surprise": true}))
        .await;
    assert_eq!(unknown_field.status, StatusCode::BAD_REQUEST);

    let not_numeric = h.get_as("/api/clients/abc", &token).await;
    assert_eq!(not_numeric.status, StatusCode::NOT_FOUND);
    assert_eq!(not_numeric.json()["message"], "client not found");
}

#[tokio::test]
async fn duplicate_client_email_is_a_conflict() {
    let h = harness();
    let token = h.token(&h.user("ann", Role::User).await);
    let client = json!({
        "last_name": "Petrova",
        "first_name": "Olga",
        "birth_date": "1990-05-17",
        "email": "olga@example.com",
        "is_subscribed": true
    });

    let first = h
        .send_json_as("POST", "/api/clients", &token, client.clone())
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = h.send_json_as("POST", "/api/clients", &token, client).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.json()["code"], "ERR_CONFLICT");
    assert_eq!(h.clients.len(), 1);
}

#[tokio::test]
async fn media_upload_stores_file_and_records_public_path() {
    let h = harness();
    h.seed_repairs(1).await;
    let token = h.token(&h.user("ann", Role::User).await);

    let reply = h
        .send(multipart_request("/api/repairs/1/media", &token, "file", b"PNGDATA"))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let photo = reply.json()["photo"]
        .as_str()
        .expect("photo path")
        .to_string();
    assert!(photo.starts_with("/images/repairs/"));
    assert!(photo.ends_with("-front.png"));

    let stored = photo.trim_start_matches("/images/");
    let on_disk = std::fs::read(h.media_dir.path().join(stored)).expect("stored file");
    assert_eq!(on_disk, b"PNGDATA");

    let missing_row = h
        .send(multipart_request("/api/repairs/77/media", &token, "file", b"PNGDATA"))
        .await;
    assert_eq!(missing_row.status, StatusCode::NOT_FOUND);

    let wrong_field = h
        .send(multipart_request("/api/repairs/1/media", &token, "avatar", b"PNGDATA"))
        .await;
    assert_eq!(wrong_field.status, StatusCode::BAD_REQUEST);
}

fn multipart_request(uri: &str, token: &str, field: &str, bytes: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "workshop-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"front.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}
