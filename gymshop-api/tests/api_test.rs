use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use gymshop_api::server::create_server;
use gymshop_api::state::AppState;
use gymshop_core::auth::TokenAuthority;
use gymshop_core::storage::InMemoryStorage;

const ADMIN_EMAIL: &str = "admin@gymshop.test";
const ADMIN_PASSWORD: &str = "admin-password";

async fn test_app() -> Result<(Router, Arc<AppState>)> {
    let storage = Arc::new(InMemoryStorage::new());
    let tokens = Arc::new(TokenAuthority::new("test-secret", 3600)?);
    let state = Arc::new(AppState::new(storage, tokens));
    state.users.ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    Ok((create_server(state.clone()), state))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, value))
}

async fn login(app: &Router, email: &str, password: &str) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(body["data"]["token"].as_str().unwrap().to_string())
}

async fn register(app: &Router, email: &str) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "longenough" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));
    Ok(body["data"]["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn health_check_is_open() -> Result<()> {
    let (app, _) = test_app().await?;
    let (status, body) = send(&app, "GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    Ok(())
}

#[tokio::test]
async fn profile_requires_bearer_token() -> Result<()> {
    let (app, _) = test_app().await?;
    let (status, body) = send(&app, "GET", "/api/users/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let token = register(&app, "member@example.com").await?;
    let (status, body) = send(&app, "GET", "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], json!("member@example.com"));
    Ok(())
}

#[tokio::test]
async fn status_route_is_admin_only() -> Result<()> {
    let (app, _) = test_app().await?;
    let token = register(&app, "member@example.com").await?;
    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/orders/{}/status", uuid::Uuid::new_v4()),
        Some(&token),
        Some(json!({ "status": "cancelled" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], json!(false));
    Ok(())
}

#[tokio::test]
async fn product_creation_is_admin_only() -> Result<()> {
    let (app, _) = test_app().await?;
    let customer = register(&app, "member@example.com").await?;
    let (status, _) = send(
        &app,
        "POST",
        "/api/products",
        Some(&customer),
        Some(json!({ "name": "Lifting Straps" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let (status, body) = send(
        &app,
        "POST",
        "/api/products",
        Some(&admin),
        Some(json!({ "name": "Lifting Straps" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], json!("Lifting Straps"));
    Ok(())
}

#[tokio::test]
async fn full_purchase_and_cancellation_flow() -> Result<()> {
    let (app, _) = test_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    // Admin sets up the catalog.
    let (_, product) = send(
        &app,
        "POST",
        "/api/products",
        Some(&admin),
        Some(json!({ "name": "Whey Protein", "category": "supplements" })),
    )
    .await?;
    let product_id = product["data"]["id"].as_str().unwrap().to_string();

    let (_, variant) = send(
        &app,
        "POST",
        "/api/variants",
        Some(&admin),
        Some(json!({
            "productId": product_id,
            "name": "Vanilla / 2kg",
            "price": 20.0,
            "stock": 5
        })),
    )
    .await?;
    let variant_id = variant["data"]["id"].as_str().unwrap().to_string();

    // Customer registers and adds an address.
    let customer = register(&app, "member@example.com").await?;
    let (_, address) = send(
        &app,
        "POST",
        "/api/addresses",
        Some(&customer),
        Some(json!({
            "recipient": "A. Lifter",
            "street": "1 Barbell Way",
            "city": "Spokane",
            "postalCode": "99201",
            "country": "US"
        })),
    )
    .await?;
    let address_id = address["data"]["id"].as_str().unwrap().to_string();

    // Order three units: stock 5 -> 2, status pending, total frozen.
    let (status, order) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&customer),
        Some(json!({
            "addressId": address_id,
            "items": [{ "variantId": variant_id, "quantity": 3 }]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["data"]["order"]["status"], json!("pending"));
    assert_eq!(order["data"]["order"]["shippingCost"], json!(0.0));
    assert_eq!(order["data"]["total"], json!(60.0));
    let order_id = order["data"]["order"]["id"].as_str().unwrap().to_string();

    let (_, variant) = send(
        &app,
        "GET",
        &format!("/api/variants/{variant_id}"),
        Some(&customer),
        None,
    )
    .await?;
    assert_eq!(variant["data"]["stock"], json!(2));

    // A second order for more than the remaining stock is a conflict.
    let (status, body) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&customer),
        Some(json!({
            "addressId": address_id,
            "items": [{ "variantId": variant_id, "quantity": 3 }]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));

    // Admin cancels the order: stock returns to 5.
    let (status, cancelled) = send(
        &app,
        "PUT",
        &format!("/api/orders/{order_id}/status"),
        Some(&admin),
        Some(json!({ "status": "cancelled" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["data"]["order"]["status"], json!("cancelled"));

    let (_, variant) = send(
        &app,
        "GET",
        &format!("/api/variants/{variant_id}"),
        Some(&customer),
        None,
    )
    .await?;
    assert_eq!(variant["data"]["stock"], json!(5));

    // An unknown status string is rejected as bad input.
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/orders/{order_id}/status"),
        Some(&admin),
        Some(json!({ "status": "exploded" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn customers_cannot_read_each_others_orders() -> Result<()> {
    let (app, state) = test_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (_, product) = send(
        &app,
        "POST",
        "/api/products",
        Some(&admin),
        Some(json!({ "name": "Chalk" })),
    )
    .await?;
    let (_, variant) = send(
        &app,
        "POST",
        "/api/variants",
        Some(&admin),
        Some(json!({
            "productId": product["data"]["id"],
            "name": "Block",
            "price": 4.5,
            "stock": 10
        })),
    )
    .await?;

    let owner = register(&app, "owner@example.com").await?;
    let (_, address) = send(
        &app,
        "POST",
        "/api/addresses",
        Some(&owner),
        Some(json!({
            "recipient": "O. Wner",
            "street": "2 Rack Row",
            "city": "Spokane",
            "postalCode": "99201",
            "country": "US"
        })),
    )
    .await?;
    let (_, order) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&owner),
        Some(json!({
            "addressId": address["data"]["id"],
            "items": [{ "variantId": variant["data"]["id"], "quantity": 1 }]
        })),
    )
    .await?;
    let order_id = order["data"]["order"]["id"].as_str().unwrap().to_string();

    let stranger = register(&app, "stranger@example.com").await?;
    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/orders/{order_id}"),
        Some(&stranger),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins can read anyone's orders.
    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/orders/{order_id}"),
        Some(&admin),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    drop(state);
    Ok(())
}
