mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use serde_json::{json, Value};

fn product_payload() -> Value {
    json!({
        "name": "Trail Runner",
        "description": "Lightweight trail running shoe with a grippy sole.",
        "category": "Footwear",
        "price": "2999.00",
        "discount": "10",
        "images": [],
        "rating": "4.2",
        "brand": "Fjell",
        "tags": ["running", "outdoor"],
        "variants": [
            { "size": "42", "color": "Blue", "stock": 4, "price": "2999.00" },
            { "size": "43", "color": "Blue", "stock": 6, "price": "2999.00" }
        ]
    })
}

#[tokio::test]
async fn empty_catalog_is_not_found() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/getProduct", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Not found: No products found");
}

#[tokio::test]
async fn admin_creates_product_with_variants() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(Method::POST, "/addproduct", Some(product_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Product created successfully");
    let product = &body["data"];
    assert_eq!(product["stockQuantity"], 10);
    assert_eq!(product["variants"].as_array().unwrap().len(), 2);
    assert_eq!(product["variants"][0]["size"], "42");
    // No images given, so the placeholder is used
    assert_eq!(product["images"].as_array().unwrap().len(), 1);

    let listed = read_json(app.request(Method::GET, "/getProduct", None, None).await).await;
    assert_eq!(listed["success"], true);
    assert_eq!(listed["data"][0]["name"], "Trail Runner");
}

#[tokio::test]
async fn shoppers_cannot_manage_the_catalog() {
    let app = TestApp::new().await;
    let response = app
        .as_shopper(Method::POST, "/addproduct", Some(product_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let product = app.seed_product(3).await;
    let response = app
        .as_shopper(Method::DELETE, &format!("/products/{}", product.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::DELETE, &format!("/products/{}", product.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_products_are_rejected() {
    let app = TestApp::new().await;

    let mut short_name = product_payload();
    short_name["name"] = json!("AB");
    let response = app.as_admin(Method::POST, "/addproduct", Some(short_name)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut duplicate = product_payload();
    duplicate["variants"][1]["size"] = json!("42");
    let response = app.as_admin(Method::POST, "/addproduct", Some(duplicate)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Duplicate variant Size: 42, Color: Blue"));

    let mut negative = product_payload();
    negative["variants"][0]["stock"] = json!(-1);
    let response = app.as_admin(Method::POST, "/addproduct", Some(negative)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_image = product_payload();
    bad_image["images"] = json!(["ftp://cdn.example.com/shoe.png"]);
    let response = app.as_admin(Method::POST, "/addproduct", Some(bad_image)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_product_keeps_order_snapshots() {
    let app = TestApp::new().await;
    let product = app.seed_product(10).await;
    let order_id = app.place_order(&product, 1).await;

    let response = app
        .as_admin(Method::DELETE, &format!("/products/{}", product.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await["message"],
        "Product deleted successfully"
    );

    let response = app
        .request(Method::GET, &format!("/products/{}", product.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .as_admin(Method::DELETE, &format!("/products/{}", product.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let order = read_json(
        app.as_shopper(Method::GET, &format!("/orders/{}", order_id), None)
            .await,
    )
    .await;
    assert_eq!(order["products"][0]["name"], "Classic Tee");
    assert!(order["products"][0]["product"].is_null());
}

fn address_payload() -> Value {
    json!({
        "fullName": "Ravi Kumar",
        "phone": "9123456780",
        "pincode": "110001",
        "state": "Delhi",
        "city": "New Delhi",
        "houseNo": "7",
        "road": "Janpath",
    })
}

#[tokio::test]
async fn addresses_are_added_listed_and_edited() {
    let app = TestApp::new().await;

    let response = app
        .as_shopper(Method::POST, "/addAddress", Some(address_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    assert_eq!(created["message"], "Address added successfully");
    let address_id = created["data"]["id"].as_str().unwrap().to_string();

    let listed = read_json(app.as_shopper(Method::GET, "/getAddress", None).await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    assert_eq!(listed["data"][0]["fullName"], "Ravi Kumar");

    let response = app
        .as_shopper(
            Method::PUT,
            &format!("/api/addresses/{}", address_id),
            Some(json!({ "city": "Gurugram", "pincode": "122001" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = read_json(response).await;
    assert_eq!(updated["data"]["city"], "Gurugram");
    assert_eq!(updated["data"]["pincode"], "122001");
    assert_eq!(updated["data"]["road"], "Janpath");
}

#[tokio::test]
async fn address_fields_are_validated() {
    let app = TestApp::new().await;

    let mut bad_phone = address_payload();
    bad_phone["phone"] = json!("12345");
    let response = app
        .as_shopper(Method::POST, "/addAddress", Some(bad_phone))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_pincode = address_payload();
    bad_pincode["pincode"] = json!("1100");
    let response = app
        .as_shopper(Method::POST, "/addAddress", Some(bad_pincode))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn another_users_address_cannot_be_edited() {
    let app = TestApp::new().await;
    let foreign = app.seed_address(&app.admin).await;

    let response = app
        .as_shopper(
            Method::PUT,
            &format!("/api/addresses/{}", foreign.id),
            Some(json!({ "city": "Elsewhere" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn address_book_requires_a_token() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/getAddress", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
