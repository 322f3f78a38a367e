mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use testresult::TestResult;
use tower::ServiceExt;
use uuid::Uuid;

use common::{account, dec, Harness};
use opensase_storefront::api;
use opensase_storefront::application::{keys, CheckoutRequest};
use opensase_storefront::infrastructure::StaticSettings;

async fn send(app: &Router, request: Request<Body>) -> TestResult<(StatusCode, Option<String>, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let cookie = response.headers().get(header::SET_COOKIE).map(|v| v.to_str().map(str::to_string)).transpose()?;
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, cookie, body))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_header(mut request: Request<Body>, name: &'static str, value: &str) -> Request<Body> {
    request.headers_mut().insert(name, value.parse().unwrap());
    request
}

#[tokio::test]
async fn health_reports_service_name() -> TestResult {
    let app = api::router(Harness::new().context);

    let (status, _, body) = send(&app, Request::get("/health").body(Body::empty())?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "opensase-storefront"}));
    Ok(())
}

#[tokio::test]
async fn guest_gets_a_session_cookie_and_can_check_out() -> TestResult {
    let h = Harness::new();
    let mug = h.product("Mug", dec("30.00"), 4).await;
    let app = api::router(h.context.clone());

    let (status, cookie, body) =
        send(&app, json_request("POST", "/api/v1/cart", json!({"productId": mug.id(), "quantity": 2}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itemCount"], 2);
    let cookie = cookie.expect("guest cookie set");
    assert!(cookie.starts_with("cart_session_id=guest_"));
    let session = cookie.split(';').next().unwrap_or_default().to_string();

    let (status, _, body) = send(&app, with_header(Request::get("/api/v1/cart").body(Body::empty())?, "cookie", &session)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["productName"], "Mug");

    let checkout = json_request("POST", "/api/v1/checkout", json!({"shippingAddressId": Uuid::now_v7()}));
    let (status, _, body) = send(&app, with_header(checkout, "cookie", &session)).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["total"], "70.00");
    assert_eq!(body["order"]["paymentMethod"], "CARD");
    assert_eq!(body["order"]["owner"]["kind"], "session");
    assert_eq!(body["paymentHandle"]["clientSecret"], "pi_0_secret");
    assert_eq!(h.stock_of(&mug).await, 2);

    let order_id = body["order"]["id"].as_str().unwrap_or_default().to_string();
    let read = Request::get(format!("/api/v1/orders/{order_id}")).body(Body::empty())?;
    let (status, _, body) = send(&app, with_header(read, "cookie", &session)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    Ok(())
}

#[tokio::test]
async fn checkout_without_identity_is_unauthorized() -> TestResult {
    let app = api::router(Harness::new().context);

    let (status, _, body) = send(&app, json_request("POST", "/api/v1/checkout", json!({"shippingAddressId": Uuid::now_v7()}))).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn business_rule_failures_are_bad_requests() -> TestResult {
    let h = Harness::new();
    let app = api::router(h.context.clone());
    let checkout = json_request("POST", "/api/v1/checkout", json!({"shippingAddressId": Uuid::now_v7()}));

    let (status, _, body) = send(&app, with_header(checkout, "x-account-id", "ada@example.com")).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Cart is empty", "kind": "EMPTY_CART"}));
    Ok(())
}

#[tokio::test]
async fn invalid_bodies_fail_validation() -> TestResult {
    let h = Harness::new();
    let mug = h.product("Mug", dec("30.00"), 4).await;
    let app = api::router(h.context.clone());

    let (status, _, body) = send(&app, json_request("POST", "/api/v1/cart", json!({"productId": mug.id(), "quantity": 0}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION_FAILED");

    let checkout = json_request("POST", "/api/v1/checkout", json!({"couponCode": "X"}));
    let (status, _, body) = send(&app, with_header(checkout, "x-account-id", "ada@example.com")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn anonymous_checkout_is_rejected_before_the_body_is_read() -> TestResult {
    let app = api::router(Harness::new().context);

    for body in [json!({}), json!({"couponCode": 7})] {
        let (status, _, body) = send(&app, json_request("POST", "/api/v1/checkout", body)).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "UNAUTHENTICATED");
    }

    let (status, _, body) = send(&app, json_request("POST", "/api/v1/checkout/preview", json!({"couponCode": 7}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn blank_coupon_code_checks_out_without_discount() -> TestResult {
    let h = Harness::new();
    let mug = h.product("Mug", dec("30.00"), 4).await;
    let app = api::router(h.context.clone());
    let add = json_request("POST", "/api/v1/cart", json!({"productId": mug.id()}));
    send(&app, with_header(add, "x-account-id", "ada@example.com")).await?;

    let preview = json_request("POST", "/api/v1/checkout/preview", json!({"couponCode": ""}));
    let (status, _, body) = send(&app, with_header(preview, "x-account-id", "ada@example.com")).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["coupon"].is_null());

    let checkout = json_request("POST", "/api/v1/checkout", json!({"shippingAddressId": Uuid::now_v7(), "couponCode": ""}));
    let (status, _, body) = send(&app, with_header(checkout, "x-account-id", "ada@example.com")).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["discount"], "0");
    assert!(body["order"]["couponId"].is_null());
    assert_eq!(body["order"]["total"], "40.00");
    Ok(())
}

#[tokio::test]
async fn preview_prices_without_side_effects() -> TestResult {
    let h = Harness::new();
    let lamp = h.product("Lamp", dec("120.00"), 1).await;
    let app = api::router(h.context.clone());
    let add = json_request("POST", "/api/v1/cart", json!({"productId": lamp.id()}));
    send(&app, with_header(add, "x-account-id", "ada@example.com")).await?;

    let preview = json_request("POST", "/api/v1/checkout/preview", json!({}));
    let (status, _, body) = send(&app, with_header(preview, "x-account-id", "ada@example.com")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pricing"]["total"], "120.00");
    assert_eq!(body["pricing"]["shipping"], "0");
    assert_eq!(h.stock_of(&lamp).await, 1);
    assert!(h.gateway.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn archived_products_cannot_be_added() -> TestResult {
    let h = Harness::new();
    let mut mug = h.product("Mug", dec("30.00"), 4).await;
    mug.archive();
    h.store.insert_product(mug.clone()).await;
    let app = api::router(h.context.clone());

    let add = json_request("POST", "/api/v1/cart", json!({"productId": mug.id()}));
    let (status, _, body) = send(&app, with_header(add, "x-account-id", "ada@example.com")).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "PRODUCT_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn foreign_cart_lines_are_not_found() -> TestResult {
    let h = Harness::new();
    let mug = h.product("Mug", dec("30.00"), 4).await;
    let app = api::router(h.context.clone());
    let add = json_request("POST", "/api/v1/cart", json!({"productId": mug.id()}));
    let (_, _, body) = send(&app, with_header(add, "x-account-id", "ada@example.com")).await?;
    let line_id = body["items"][0]["id"].as_str().unwrap_or_default().to_string();

    let update = json_request("PATCH", &format!("/api/v1/cart/{line_id}"), json!({"quantity": 2}));
    let (status, _, body) = send(&app, with_header(update, "x-account-id", "eve@example.com")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "ITEM_NOT_FOUND");

    let remove = Request::delete(format!("/api/v1/cart/{line_id}")).body(Body::empty())?;
    let (status, _, body) = send(&app, with_header(remove, "x-account-id", "ada@example.com")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itemCount"], 0);
    Ok(())
}

#[tokio::test]
async fn admin_status_updates_require_the_token() -> TestResult {
    let h = Harness::with_settings(StaticSettings::new().with(keys::ADMIN_API_TOKEN, "s3cret"));
    let mug = h.product("Mug", dec("30.00"), 3).await;
    let ada = account("ada");
    h.add(&ada, &mug, 1).await;
    let receipt = h
        .context
        .checkout
        .checkout(
            Some(ada),
            CheckoutRequest { shipping_address_id: Uuid::now_v7(), billing_address_id: None, coupon_code: None, payment_method: None },
        )
        .await?;
    let app = api::router(h.context.clone());
    let uri = format!("/api/v1/admin/orders/{}", receipt.order.id());

    let (status, _, _) = send(&app, json_request("PATCH", &uri, json!({"status": "CONFIRMED"}))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let wrong = json_request("PATCH", &uri, json!({"status": "CONFIRMED"}));
    let (status, _, _) = send(&app, with_header(wrong, "authorization", "Bearer s3cre")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let ship = json_request("PATCH", &uri, json!({"status": "SHIPPED", "trackingNumber": "1Z999", "shippingCarrier": "UPS"}));
    let (status, _, body) = send(&app, with_header(ship, "authorization", "Bearer s3cret")).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "SHIPPED");
    assert_eq!(body["trackingNumber"], "1Z999");
    assert!(body["shippedAt"].is_string());

    let back = json_request("PATCH", &uri, json!({"status": "PENDING"}));
    let (status, _, body) = send(&app, with_header(back, "authorization", "Bearer s3cret")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "INVALID_STATUS_TRANSITION");
    Ok(())
}

#[tokio::test]
async fn admin_routes_are_closed_without_a_configured_token() -> TestResult {
    let app = api::router(Harness::new().context);
    let request = json_request("PATCH", &format!("/api/v1/admin/orders/{}", Uuid::now_v7()), json!({"status": "CONFIRMED"}));

    let (status, _, body) = send(&app, with_header(request, "authorization", "Bearer anything")).await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn orders_of_other_shoppers_are_not_found() -> TestResult {
    let h = Harness::new();
    let mug = h.product("Mug", dec("30.00"), 3).await;
    let ada = account("ada");
    h.add(&ada, &mug, 1).await;
    let receipt = h
        .context
        .checkout
        .checkout(
            Some(ada),
            CheckoutRequest { shipping_address_id: Uuid::now_v7(), billing_address_id: None, coupon_code: None, payment_method: None },
        )
        .await?;
    let app = api::router(h.context.clone());
    let read = Request::get(format!("/api/v1/orders/{}", receipt.order.id())).body(Body::empty())?;

    let (status, _, body) = send(&app, with_header(read, "x-account-id", "eve@example.com")).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "ORDER_NOT_FOUND");
    Ok(())
}
