mod common;

use axum::http::{Method, StatusCode};
use chrono::DateTime;
use common::{order_body, read_json, TestApp, CLIENT_URL};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn order_is_created_with_snapshots_and_redirect() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.shopper,
                &product,
                2,
                "499.00",
                "998.00",
                &address.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    let order_id = body["orderId"].as_str().unwrap().to_string();
    assert_eq!(
        body["redirectUrl"],
        format!("{}/payment/{}", CLIENT_URL, order_id)
    );

    let response = app
        .as_shopper(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = read_json(response).await;
    assert_eq!(order["orderStatus"], "Processing");
    assert_eq!(order["paymentStatus"], "Pending");
    assert_eq!(order["user"]["email"], "shopper@example.com");
    assert_eq!(order["shippingAddress"]["id"], address.id.to_string());
    assert_eq!(order["products"][0]["quantity"], 2);
    assert_eq!(order["products"][0]["variant"]["size"], "M");
    assert_eq!(order["products"][0]["product"]["name"], "Classic Tee");

    let placed = DateTime::parse_from_rfc3339(order["orderDate"].as_str().unwrap()).unwrap();
    let due = DateTime::parse_from_rfc3339(order["deliveryDate"].as_str().unwrap()).unwrap();
    assert_eq!((due - placed).num_days(), 7);

    // The shipping address becomes the user's current address
    let me = read_json(app.as_shopper(Method::GET, "/users/me", None).await).await;
    assert_eq!(me["currentAddressId"], address.id.to_string());
}

#[tokio::test]
async fn numeric_prices_are_accepted_too() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(json!({
                "userId": app.shopper.id,
                "products": [{
                    "productId": product.id,
                    "quantity": 1,
                    "price": 549,
                    "variant": { "size": "L", "color": "White" }
                }],
                "totalAmount": 549.0,
                "shippingAddressId": address.id,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn tampered_price_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.shopper,
                &product,
                2,
                "450.00",
                "900.00",
                &address.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Price mismatch"), "{}", message);
    assert!(message.contains("Classic Tee"), "{}", message);
}

#[tokio::test]
async fn wrong_total_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.shopper,
                &product,
                2,
                "499.00",
                "900.00",
                &address.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(
        body["message"],
        "Total mismatch: expected 998.00, got 900.00"
    );
}

#[tokio::test]
async fn unknown_variant_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let mut body = order_body(
        &app.shopper,
        &product,
        1,
        "499.00",
        "499.00",
        &address.id.to_string(),
    );
    body["products"][0]["variant"] = json!({ "size": "XL", "color": "Black" });

    let response = app.as_shopper(Method::POST, "/createOrder", Some(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err = read_json(response).await;
    assert!(err["message"]
        .as_str()
        .unwrap()
        .contains("Variant (Size: XL, Color: Black) not found"));

    let orders = read_json(
        app.as_shopper(
            Method::GET,
            &format!("/orders/user/{}", app.shopper.id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(orders.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let mut body = order_body(
        &app.shopper,
        &product,
        1,
        "499.00",
        "499.00",
        &address.id.to_string(),
    );
    body["products"][0]["productId"] = json!(uuid::Uuid::new_v4());

    let response = app.as_shopper(Method::POST, "/createOrder", Some(body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_cart_fails_validation() {
    let app = TestApp::new().await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(json!({
                "userId": app.shopper.id,
                "products": [],
                "totalAmount": "0.00",
                "shippingAddressId": address.id,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shoppers_cannot_order_for_someone_else() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.admin).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.admin,
                &product,
                1,
                "499.00",
                "499.00",
                &address.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn shipping_address_must_belong_to_the_user() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let foreign = app.seed_address(&app.admin).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.shopper,
                &product,
                1,
                "499.00",
                "499.00",
                &foreign.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ordering_requires_a_token() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::POST, "/createOrder", Some(json!({})), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_history_is_private_to_its_owner() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let order_id = app.place_order(&product, 1).await;

    let other = app
        .state
        .services
        .users
        .find_or_create("Someone Else", "else@example.com", &["user"])
        .await
        .unwrap();
    let token = app.auth.issue_access_token(&other).unwrap();

    let response = app
        .request(Method::GET, &format!("/orders/{}", order_id), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::GET,
            &format!("/orders/user/{}", app.shopper.id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admins see every order
    let response = app
        .as_admin(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_moves_order_through_fulfilment_statuses() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let order_id = app.place_order(&product, 1).await;
    let uri = format!("/orders/{}/status", order_id);

    let response = app
        .as_shopper(Method::PUT, &uri, Some(json!({ "orderStatus": "Shipped" })))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_admin(Method::PUT, &uri, Some(json!({ "orderStatus": "Shipped" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["orderStatus"], "Shipped");

    // Completion only happens through payment settlement
    let response = app
        .as_admin(Method::PUT, &uri, Some(json!({ "orderStatus": "Completed" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_order_id_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app.as_shopper(Method::GET, "/orders/not-a-uuid", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivery_estimate_is_public() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/orders/delivery-estimate", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["leadDays"], 7);
}

#[tokio::test]
async fn stored_total_is_the_catalog_total() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(order_body(
                &app.shopper,
                &product,
                2,
                "499.00",
                "998.004",
                &address.id.to_string(),
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order_id = read_json(response).await["orderId"]
        .as_str()
        .unwrap()
        .to_string();

    let order = read_json(
        app.as_shopper(Method::GET, &format!("/orders/{}", order_id), None)
            .await,
    )
    .await;
    let stored: Decimal = order["totalAmount"].as_str().unwrap().parse().unwrap();
    assert_eq!(stored, dec!(998.00));
}
