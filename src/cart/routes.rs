//! Cart and product REST API routes

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;

use super::{
    error::CartError,
    models::{Cart, ItemRequest, NewProduct, Product, Purchase, QuantityRequest},
    service::CartService,
};
use crate::auth::{
    dispatch::{authenticate, passport_call},
    guard::authorization,
    models::{Identity, Role},
    strategy::{Strategy, StrategyRegistry},
};

/// Create cart router; every route needs a session and the user role
pub fn cart_router(service: CartService, registry: Arc<StrategyRegistry>) -> Router {
    // Layers run bottom-up: the token is checked before the role.
    Router::new()
        .route("/", post(create_cart))
        .route("/{cid}", get(get_cart).put(replace_items).delete(clear_cart))
        .route(
            "/{cid}/products/{pid}",
            post(add_product).put(set_quantity).delete(remove_product),
        )
        .route("/{cid}/purchase", post(purchase))
        .route_layer(middleware::from_fn_with_state(Role::User, authorization))
        .route_layer(middleware::from_fn_with_state(
            passport_call(registry, Strategy::Token),
            authenticate::<StrategyRegistry>,
        ))
        .with_state(service)
}

/// Create product router; listing is public, creation is admin only
pub fn product_router(service: CartService, registry: Arc<StrategyRegistry>) -> Router {
    Router::new()
        .route(
            "/",
            get(list_products).merge(
                post(create_product)
                    .route_layer(middleware::from_fn_with_state(Role::Admin, authorization))
                    .route_layer(middleware::from_fn_with_state(
                        passport_call(registry, Strategy::Token),
                        authenticate::<StrategyRegistry>,
                    )),
            ),
        )
        .route("/{pid}", get(get_product))
        .with_state(service)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, CartError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        log::debug!("Rejected cart request body: {}", rejection);
        CartError::InvalidBody
    })
}

// ==================== Products ====================

/// GET /api/products
async fn list_products(State(service): State<CartService>) -> Result<Json<Vec<Product>>, CartError> {
    Ok(Json(service.list_products()?))
}

/// GET /api/products/{pid}
async fn get_product(
    State(service): State<CartService>,
    Path(pid): Path<String>,
) -> Result<Json<Product>, CartError> {
    Ok(Json(service.get_product(&pid)?))
}

/// POST /api/products
async fn create_product(
    State(service): State<CartService>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<impl IntoResponse, CartError> {
    let product = service.create_product(json_body(payload)?)?;
    log::info!("Product {} created", product.code);
    Ok((StatusCode::CREATED, Json(product)))
}

// ==================== Carts ====================

/// POST /api/carts
async fn create_cart(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
) -> Result<impl IntoResponse, CartError> {
    let cart = service.create_cart(&user)?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// GET /api/carts/{cid}
async fn get_cart(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path(cid): Path<String>,
) -> Result<Json<Cart>, CartError> {
    Ok(Json(service.get_cart(&user, &cid)?))
}

/// PUT /api/carts/{cid} - replace every line
async fn replace_items(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path(cid): Path<String>,
    payload: Result<Json<Vec<ItemRequest>>, JsonRejection>,
) -> Result<Json<Cart>, CartError> {
    let items = json_body(payload)?;
    Ok(Json(service.replace_items(&user, &cid, items)?))
}

/// DELETE /api/carts/{cid} - empty the cart
async fn clear_cart(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path(cid): Path<String>,
) -> Result<Json<Cart>, CartError> {
    Ok(Json(service.clear(&user, &cid)?))
}

/// POST /api/carts/{cid}/products/{pid}
///
/// Adds one unit unless the body carries `{"quantity": n}`.
async fn add_product(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path((cid, pid)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Cart>, CartError> {
    let quantity = if body.iter().all(u8::is_ascii_whitespace) {
        1
    } else {
        serde_json::from_slice::<QuantityRequest>(&body)
            .map_err(|_| CartError::InvalidBody)?
            .quantity
    };
    Ok(Json(service.add_product(&user, &cid, &pid, quantity)?))
}

/// PUT /api/carts/{cid}/products/{pid} - quantity 0 drops the line
async fn set_quantity(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path((cid, pid)): Path<(String, String)>,
    payload: Result<Json<QuantityRequest>, JsonRejection>,
) -> Result<Json<Cart>, CartError> {
    let QuantityRequest { quantity } = json_body(payload)?;
    Ok(Json(service.set_quantity(&user, &cid, &pid, quantity)?))
}

/// DELETE /api/carts/{cid}/products/{pid}
async fn remove_product(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path((cid, pid)): Path<(String, String)>,
) -> Result<Json<Cart>, CartError> {
    Ok(Json(service.remove_product(&user, &cid, &pid)?))
}

/// POST /api/carts/{cid}/purchase
async fn purchase(
    State(service): State<CartService>,
    Extension(user): Extension<Identity>,
    Path(cid): Path<String>,
) -> Result<(StatusCode, Json<Purchase>), CartError> {
    let purchase = service.purchase(&user, &cid)?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        database::UserDatabase,
        jwt::{JwtConfig, JwtManager},
        models::NewIdentity,
        oauth::{OAuthConfig, OAuthManager},
    };
    use crate::cart::database::CartDatabase;
    use crate::db::Database;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::COOKIE, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    struct Fixture {
        carts: Router,
        products: Router,
        registry: Arc<StrategyRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::in_memory().unwrap();
            let users = UserDatabase::new(db.clone()).unwrap();
            let service = CartService::new(CartDatabase::new(db).unwrap(), users.clone());
            let registry = Arc::new(StrategyRegistry::new(
                users,
                JwtManager::new(JwtConfig::new("cart-secret".to_string(), 1)),
                OAuthManager::new(OAuthConfig::disabled()),
            ));
            Self {
                carts: cart_router(service.clone(), Arc::clone(&registry)),
                products: product_router(service, Arc::clone(&registry)),
                registry,
            }
        }

        fn cookie_for(&self, email: &str, role: Role) -> String {
            let identity = self
                .registry
                .directory()
                .create(NewIdentity {
                    first_name: "Cart".to_string(),
                    last_name: "Owner".to_string(),
                    email: email.to_string(),
                    age: 40,
                    role,
                    password_hash: None,
                })
                .unwrap();
            let token = self.registry.jwt().create_token(&identity).unwrap();
            format!("jwt={token}")
        }
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_carts_require_session() {
        let fixture = Fixture::new();
        let response = fixture
            .carts
            .oneshot(request("POST", "/", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "No auth token");
    }

    #[tokio::test]
    async fn test_admin_cannot_use_carts() {
        let fixture = Fixture::new();
        let admin = fixture.cookie_for("admin@example.com", Role::Admin);
        let response = fixture
            .carts
            .oneshot(request("POST", "/", Some(&admin), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["error"], "No permissions");
    }

    #[tokio::test]
    async fn test_product_creation_is_admin_only() {
        let fixture = Fixture::new();
        let user = fixture.cookie_for("user@example.com", Role::User);
        let admin = fixture.cookie_for("admin@example.com", Role::Admin);
        let product = serde_json::json!({
            "title": "Mug",
            "code": "MUG",
            "price_cents": 1200,
            "stock": 3,
        });

        let response = fixture
            .products
            .clone()
            .oneshot(request("POST", "/", Some(&user), Some(product.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = fixture
            .products
            .clone()
            .oneshot(request("POST", "/", Some(&admin), Some(product.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response).await["id"].as_str().unwrap().to_string();

        let response = fixture
            .products
            .clone()
            .oneshot(request("POST", "/", Some(&admin), Some(product)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = fixture
            .products
            .oneshot(request("GET", &format!("/{id}"), None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["code"], "MUG");
    }

    #[tokio::test]
    async fn test_add_product_default_and_explicit_quantity() {
        let fixture = Fixture::new();
        let admin = fixture.cookie_for("admin@example.com", Role::Admin);
        let user = fixture.cookie_for("user@example.com", Role::User);

        let response = fixture
            .products
            .clone()
            .oneshot(request(
                "POST",
                "/",
                Some(&admin),
                Some(serde_json::json!({
                    "title": "Tea",
                    "code": "TEA",
                    "price_cents": 300,
                    "stock": 10,
                })),
            ))
            .await
            .unwrap();
        let pid = json(response).await["id"].as_str().unwrap().to_string();

        let response = fixture
            .carts
            .clone()
            .oneshot(request("POST", "/", Some(&user), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cid = json(response).await["id"].as_str().unwrap().to_string();

        let uri = format!("/{cid}/products/{pid}");
        let response = fixture
            .carts
            .clone()
            .oneshot(request("POST", &uri, Some(&user), None))
            .await
            .unwrap();
        assert_eq!(json(response).await["items"][0]["quantity"], 1);

        let response = fixture
            .carts
            .clone()
            .oneshot(request(
                "POST",
                &uri,
                Some(&user),
                Some(serde_json::json!({ "quantity": 2 })),
            ))
            .await
            .unwrap();
        assert_eq!(json(response).await["items"][0]["quantity"], 3);

        let response = fixture
            .carts
            .oneshot(request(
                "PUT",
                &uri,
                Some(&user),
                Some(serde_json::json!({ "quantity": "many" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
