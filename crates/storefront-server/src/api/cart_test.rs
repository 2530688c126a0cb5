use super::*;
use crate::api::test_support::{body_json, product_size_id, seed, send, test_app};
use axum::http::{header::SET_COOKIE, Request};

const SESSION: &str = "test-session-1";

fn fields(pairs: &[(&str, &str)]) -> FormFields {
    FormFields(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-session-key", SESSION)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-session-key", SESSION)
        .body(Body::empty())
        .expect("request")
}

#[test]
fn add_form_requires_positive_quantity() {
    let errors = AddToCartForm::parse(&fields(&[]), &[1]).expect_err("missing quantity");
    assert_eq!(errors["quantity"], vec![REQUIRED.to_string()]);

    let errors = AddToCartForm::parse(&fields(&[("quantity", "two")]), &[1]).expect_err("nan");
    assert_eq!(errors["quantity"], vec![NOT_A_NUMBER.to_string()]);

    let errors = AddToCartForm::parse(&fields(&[("quantity", "0")]), &[1]).expect_err("zero");
    assert_eq!(errors["quantity"], vec![BELOW_MIN.to_string()]);
}

#[test]
fn add_form_size_must_be_an_offered_choice() {
    let form = AddToCartForm::parse(&fields(&[("quantity", "2"), ("size_id", "7")]), &[7, 9])
        .expect("valid form");
    assert_eq!(
        form,
        AddToCartForm {
            size_id: Some(7),
            quantity: 2
        }
    );

    let form = AddToCartForm::parse(&fields(&[("quantity", "1"), ("size_id", " ")]), &[])
        .expect("blank size is optional");
    assert_eq!(form.size_id, None);

    let errors = AddToCartForm::parse(&fields(&[("quantity", "1"), ("size_id", "8")]), &[7])
        .expect_err("size not offered");
    assert_eq!(errors["size_id"], vec![INVALID_CHOICE.to_string()]);
    assert!(!errors.contains_key("quantity"));
}

#[test]
fn update_quantity_defaults_to_one() {
    assert_eq!(parse_update_quantity(&fields(&[])).expect("default"), 1);
    assert_eq!(
        parse_update_quantity(&fields(&[("quantity", "4")])).expect("parsed"),
        4
    );
    let err = parse_update_quantity(&fields(&[("quantity", "lots")])).expect_err("bad format");
    assert_eq!(err.body.error, "Invalid quantity format");
}

#[sqlx::test(migrations = "../../migrations")]
async fn new_visitor_gets_session_cookie(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let response = send(
        &app,
        Request::builder()
            .uri("/cart/count")
            .body(Body::empty())
            .expect("request"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie issued");
    assert!(cookie.starts_with("sessionid="));
    assert!(response.headers().contains_key("x-session-key"));

    let json = body_json(response).await;
    assert_eq!(json["total_items"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn add_to_cart_reports_totals_and_merges(pool: sqlx::PgPool) {
    seed(&pool).await;
    let size_s = product_size_id(&pool, "linen-dress", "S").await;
    let app = test_app(pool);
    let uri = "/cart/add/linen-dress";

    let response = send(&app, post_form(uri, &format!("size_id={size_s}&quantity=3"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["total_items"], 3);
    assert_eq!(json["message"], "Linen Dress added to cart");
    let item_id = json["cart_item_id"].as_i64().expect("cart item id");

    // 3 + 3 exceeds the 5 in stock.
    let response = send(&app, post_form(uri, &format!("size_id={size_s}&quantity=3"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Can't add 3 items. Only 2 more available.");

    let response = send(&app, post_form(uri, &format!("size_id={size_s}&quantity=2"))).await;
    let json = body_json(response).await;
    assert_eq!(json["cart_item_id"], item_id);
    assert_eq!(json["total_items"], 5);

    let json = body_json(send(&app, get("/cart/count")).await).await;
    assert_eq!(json["total_items"], 5);
    assert_eq!(json["subtotal"], "249.50");
}

#[sqlx::test(migrations = "../../migrations")]
async fn add_to_cart_validation_errors(pool: sqlx::PgPool) {
    seed(&pool).await;
    let silk_s = product_size_id(&pool, "silk-dress", "S").await;
    let app = test_app(pool);

    let response = send(
        &app,
        post_form("/cart/add/silk-dress", &format!("size_id={silk_s}&quantity=0")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid form data");
    assert_eq!(json["errors"]["quantity"][0], BELOW_MIN);
    // Silk S has no stock, so it is not a valid choice.
    assert_eq!(json["errors"]["size_id"][0], INVALID_CHOICE);

    let response = send(&app, post_form("/cart/add/no-such-dress", "quantity=1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Product not found");

    let response = send(&app, post_form("/cart/add/sold-out-sandal", "quantity=1")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No sizes available");

    let response = send(&app, post_form("/cart/add/silk-dress", "quantity=3")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Only 2 items available");
}

#[sqlx::test(migrations = "../../migrations")]
async fn add_to_cart_accepts_json_body(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/cart/add/linen-dress")
            .header("x-session-key", SESSION)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"quantity": 2, "size_id": null}"#))
            .expect("request"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total_items"], 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_and_remove_return_cart_view(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let json = body_json(send(&app, post_form("/cart/add/linen-dress", "quantity=1")).await).await;
    let item_id = json["cart_item_id"].as_i64().expect("cart item id");

    let response = send(
        &app,
        post_form(&format!("/cart/items/{item_id}/update"), "quantity=4"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_items"], 4);
    assert_eq!(json["items"][0]["quantity"], 4);
    assert_eq!(json["items"][0]["size_name"], "S");

    let response = send(
        &app,
        post_form(&format!("/cart/items/{item_id}/update"), "quantity=9"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Only 5 items available");

    let response = send(
        &app,
        post_form(&format!("/cart/items/{item_id}/update"), "quantity=-1"),
    )
    .await;
    assert_eq!(body_json(response).await["error"], "Invalid quantity");

    let response = send(&app, post_form(&format!("/cart/items/{item_id}/remove"), "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_items"], 0);
    assert_eq!(json["items"].as_array().map(Vec::len), Some(0));

    let response = send(&app, post_form(&format!("/cart/items/{item_id}/remove"), "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Item not found");

    let response = send(
        &app,
        post_form(&format!("/cart/items/{item_id}/update"), "quantity=1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn items_are_scoped_to_their_session(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let json = body_json(send(&app, post_form("/cart/add/linen-dress", "quantity=1")).await).await;
    let item_id = json["cart_item_id"].as_i64().expect("cart item id");

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/cart/items/{item_id}/remove"))
            .header("x-session-key", "someone-else")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(send(&app, get("/cart")).await).await;
    assert_eq!(json["total_items"], 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn clear_answers_by_client_kind(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);
    send(&app, post_form("/cart/add/linen-dress", "quantity=2")).await;

    let response = send(&app, post_form("/cart/clear", "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Cart cleared");

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/cart/clear")
            .header("x-session-key", SESSION)
            .header("hx-request", "true")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_items"], 0);
    assert!(json["items"].as_array().is_some_and(Vec::is_empty));
}
