mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

fn success_uri(session_id: &str, payment_id: &str) -> String {
    format!("/success?session_id={}&paymentId={}", session_id, payment_id)
}

async fn product_json(app: &TestApp, product_id: uuid::Uuid) -> Value {
    let response = app
        .request(Method::GET, &format!("/products/{}", product_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await["data"].clone()
}

fn variant_stock(product: &Value, size: &str, color: &str) -> i64 {
    product["variants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["size"] == size && v["color"] == color)
        .and_then(|v| v["stock"].as_i64())
        .expect("variant present")
}

#[tokio::test]
async fn paid_session_settles_payment_order_and_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (order_id, payment_id) = app.checkout(&product, 2, "cs_paid_1").await;
    app.mock_session_status("cs_paid_1", "paid").await;

    let response = app
        .request(Method::GET, &success_uri("cs_paid_1", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Payment successful and order updated");
    assert_eq!(body["payment"]["paymentStatus"], "Completed");
    assert_eq!(body["payment"]["transactionId"], "cs_paid_1");
    assert!(!body["payment"]["completedAt"].is_null());
    assert_eq!(body["order"]["id"], order_id);
    assert_eq!(body["order"]["orderStatus"], "Completed");
    assert_eq!(body["order"]["paymentStatus"], "Paid");
    assert_eq!(body["stockShortfalls"].as_array().unwrap().len(), 0);

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 8);
    assert_eq!(variant_stock(&product, "L", "White"), 5);
    assert_eq!(product["stockQuantity"], 13);

    let me = read_json(app.as_shopper(Method::GET, "/users/me", None).await).await;
    assert_eq!(me["orderHistory"][0], order_id);
}

#[tokio::test]
async fn repeated_success_callback_is_idempotent() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (order_id, payment_id) = app.checkout(&product, 3, "cs_replay").await;
    app.mock_session_status("cs_replay", "paid").await;

    let first = app
        .request(Method::GET, &success_uri("cs_replay", &payment_id), None, None)
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    for _ in 0..2 {
        let again = app
            .request(Method::GET, &success_uri("cs_replay", &payment_id), None, None)
            .await;
        assert_eq!(again.status(), StatusCode::OK);
        let body = read_json(again).await;
        assert_eq!(body["message"], "Payment already processed");
        assert_eq!(body["payment"]["paymentStatus"], "Completed");
    }

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 7);

    let me = read_json(app.as_shopper(Method::GET, "/users/me", None).await).await;
    let history: Vec<&Value> = me["orderHistory"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|id| **id == order_id)
        .collect();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn insufficient_stock_is_reported_and_never_goes_negative() {
    let app = TestApp::new().await;
    let product = app.seed_product(1).await;
    let (_order_id, payment_id) = app.checkout(&product, 3, "cs_short").await;
    app.mock_session_status("cs_short", "paid").await;

    let response = app
        .request(Method::GET, &success_uri("cs_short", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["order"]["orderStatus"], "Completed");

    let shortfalls = body["stockShortfalls"].as_array().unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0]["productId"], product.id.to_string());
    assert_eq!(shortfalls[0]["size"], "M");
    assert_eq!(shortfalls[0]["color"], "Black");
    assert_eq!(shortfalls[0]["requested"], 3);
    assert_eq!(shortfalls[0]["available"], 1);

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 1);
}

#[tokio::test]
async fn unpaid_session_leaves_everything_pending() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (order_id, payment_id) = app.checkout(&product, 1, "cs_unpaid").await;
    app.mock_session_status("cs_unpaid", "unpaid").await;

    let response = app
        .request(Method::GET, &success_uri("cs_unpaid", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let payment = read_json(
        app.as_shopper(
            Method::GET,
            &format!("/payments/{}/details", payment_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(payment["paymentStatus"], "Pending");

    let order = read_json(
        app.as_shopper(Method::GET, &format!("/orders/{}", order_id), None)
            .await,
    )
    .await;
    assert_eq!(order["orderStatus"], "Processing");

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 10);
}

#[tokio::test]
async fn session_must_belong_to_the_payment() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (_order_id, payment_id) = app.checkout(&product, 1, "cs_mine").await;
    app.mock_session_status("cs_someone_else", "paid").await;

    let response = app
        .request(
            Method::GET,
            &success_uri("cs_someone_else", &payment_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (_order_id, payment_id) = app.checkout(&product, 1, "cs_known").await;

    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "message": "No such checkout.session", "type": "invalid_request_error" }
        })))
        .mount(&app.stripe)
        .await;

    let response = app
        .request(Method::GET, &success_uri("cs_missing", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_or_malformed_parameters_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/success?paymentId=abc", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, "/success?session_id=cs_1&paymentId=abc", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settled_order_rejects_further_payments() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (order_id, payment_id) = app.checkout(&product, 1, "cs_done").await;
    app.mock_session_status("cs_done", "paid").await;

    let response = app
        .request(Method::GET, &success_uri("cs_done", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_shopper(
            Method::POST,
            "/payments",
            Some(serde_json::json!({ "orderId": order_id, "paymentMethod": "UPI" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unstarted_payment_rejects_a_stray_paid_session() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let order_id = app.place_order(&product, 5).await;
    let payment_id = app.create_payment(&order_id).await;
    app.mock_session_status("cs_someone_else", "paid").await;

    let response = app
        .request(
            Method::GET,
            &success_uri("cs_someone_else", &payment_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = read_json(
        app.as_shopper(Method::GET, &format!("/orders/{}", order_id), None)
            .await,
    )
    .await;
    assert_eq!(order["orderStatus"], "Processing");
    assert_eq!(order["paymentStatus"], "Pending");

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 10);
}

#[tokio::test]
async fn session_settled_for_one_payment_cannot_settle_another() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let (_first_order, first_payment) = app.checkout(&product, 1, "cs_cheap").await;
    app.mock_session_for("cs_cheap", "paid", Some(first_payment.as_str()))
        .await;

    let response = app
        .request(Method::GET, &success_uri("cs_cheap", &first_payment), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let second_order = app.place_order(&product, 5).await;
    let second_payment = app.create_payment(&second_order).await;

    let response = app
        .request(Method::GET, &success_uri("cs_cheap", &second_payment), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = read_json(
        app.as_shopper(Method::GET, &format!("/orders/{}", second_order), None)
            .await,
    )
    .await;
    assert_eq!(order["orderStatus"], "Processing");

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 9);
}

#[tokio::test]
async fn session_referencing_the_payment_settles_it() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let order_id = app.place_order(&product, 2).await;
    let payment_id = app.create_payment(&order_id).await;
    app.mock_session_for("cs_referenced", "paid", Some(payment_id.as_str()))
        .await;

    let response = app
        .request(Method::GET, &success_uri("cs_referenced", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["payment"]["transactionId"], "cs_referenced");
    assert_eq!(body["order"]["paymentStatus"], "Paid");
}

#[tokio::test]
async fn short_line_is_skipped_while_other_lines_are_fulfilled() {
    let app = TestApp::new().await;
    let product = app.seed_product(1).await;
    let address = app.seed_address(&app.shopper).await;

    let response = app
        .as_shopper(
            Method::POST,
            "/createOrder",
            Some(json!({
                "userId": app.shopper.id,
                "products": [
                    {
                        "productId": product.id,
                        "quantity": 3,
                        "price": "499.00",
                        "variant": { "size": "M", "color": "Black" }
                    },
                    {
                        "productId": product.id,
                        "quantity": 2,
                        "price": "549.00",
                        "variant": { "size": "L", "color": "White" }
                    }
                ],
                "totalAmount": "2595.00",
                "shippingAddressId": address.id,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order_id = read_json(response).await["orderId"]
        .as_str()
        .unwrap()
        .to_string();

    let payment_id = app.create_payment(&order_id).await;
    app.mock_session_created("cs_mixed").await;
    let response = app
        .as_shopper(Method::GET, &format!("/payments/{}", payment_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.mock_session_status("cs_mixed", "paid").await;

    let response = app
        .request(Method::GET, &success_uri("cs_mixed", &payment_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["order"]["orderStatus"], "Completed");

    let shortfalls = body["stockShortfalls"].as_array().unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0]["size"], "M");
    assert_eq!(shortfalls[0]["color"], "Black");

    let product = product_json(&app, product.id).await;
    assert_eq!(variant_stock(&product, "M", "Black"), 1);
    assert_eq!(variant_stock(&product, "L", "White"), 3);
    assert_eq!(product["stockQuantity"], 4);
}
