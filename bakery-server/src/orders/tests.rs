//! Order workflow tests
//!
//! Exercise assembly and lifecycle against a real (temporary) SQLite
//! database, with a recording notifier standing in for the mail gateway.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use shared::models::{
    CreateOrderRequest, ItemQuantityUpdate, ModifyOrderRequest, OrderItemInput, OrderStatus,
    Product, ProductCreate, ProductUpdate, Role, UpdateStatusRequest,
};

use crate::auth::{CurrentUser, JwtConfig, JwtService};
use crate::core::{Config, ServerState};
use crate::db::DbService;
use crate::db::repository::user::NewUser;
use crate::db::repository::{order as order_repo, product as product_repo, user as user_repo};
use crate::notify::{Notifier, OrderEvents};
use crate::orders::{assembly, lifecycle};
use crate::utils::AppError;

// =============================================================================
// Harness
// =============================================================================

/// Records every email instead of sending it.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
    }
}

struct TestHarness {
    _dir: TempDir,
    state: ServerState,
    notifier: Arc<RecordingNotifier>,
}

fn test_config(work_dir: &str) -> Config {
    Config {
        work_dir: work_dir.to_string(),
        http_port: 0,
        environment: "test".to_string(),
        jwt: JwtConfig {
            secret: "order-workflow-test-secret-order-workflow".to_string(),
            expiration_minutes: 60,
        },
        admin_name: "Administrator".to_string(),
        admin_email: None,
        admin_password: None,
        mail_gateway_url: None,
        mail_from: "no-reply@test.local".to_string(),
    }
}

async fn setup() -> TestHarness {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("test.db");
    let db = DbService::new(&db_path.to_string_lossy())
        .await
        .expect("test database");

    let notifier = Arc::new(RecordingNotifier::default());
    let state = ServerState::new(
        test_config(&dir.path().to_string_lossy()),
        db.pool,
        Arc::new(JwtService::with_config(JwtConfig {
            secret: "order-workflow-test-secret-order-workflow".to_string(),
            expiration_minutes: 60,
        })),
        OrderEvents::new(),
        notifier.clone(),
    );

    TestHarness {
        _dir: dir,
        state,
        notifier,
    }
}

async fn customer(state: &ServerState, email: &str) -> CurrentUser {
    let user = user_repo::create(
        &state.db,
        NewUser {
            name: "Cliente".to_string(),
            email: email.to_string(),
            hash_pass: "not-a-real-hash".to_string(),
            role: Role::Customer,
            phone: None,
            address: None,
        },
    )
    .await
    .expect("create customer");
    CurrentUser {
        id: user.id,
        email: user.email,
        role: Role::Customer,
    }
}

async fn admin(state: &ServerState) -> CurrentUser {
    let user = user_repo::create(
        &state.db,
        NewUser {
            name: "Dueña".to_string(),
            email: "owner@bakery.test".to_string(),
            hash_pass: "not-a-real-hash".to_string(),
            role: Role::Admin,
            phone: None,
            address: None,
        },
    )
    .await
    .expect("create admin");
    CurrentUser {
        id: user.id,
        email: user.email,
        role: Role::Admin,
    }
}

async fn product(state: &ServerState, name: &str, price: f64, stock: i64) -> Product {
    product_repo::create(
        &state.db,
        ProductCreate {
            name: name.to_string(),
            description: None,
            price,
            stock,
            category: None,
            image_url: None,
            featured: None,
        },
    )
    .await
    .expect("create product")
}

fn order_req(items: Vec<(i64, i64)>) -> CreateOrderRequest {
    CreateOrderRequest {
        items: items
            .into_iter()
            .map(|(product_id, quantity)| OrderItemInput {
                product_id,
                quantity,
            })
            .collect(),
        payment_method: "cash".to_string(),
        is_delivery: false,
        delivery_address: None,
    }
}

async fn stock_of(state: &ServerState, id: i64) -> i64 {
    product_repo::find_by_id(&state.db, id)
        .await
        .unwrap()
        .unwrap()
        .stock
}

// =============================================================================
// Order Assembly
// =============================================================================

#[tokio::test]
async fn create_order_decrements_stock_and_computes_total() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 5).await;

    let response = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 3)]))
        .await
        .unwrap();

    assert_eq!(response.order.order.status, OrderStatus::Pending);
    assert_eq!(response.order.order.total, 7.50);
    assert_eq!(response.order.items.len(), 1);
    assert_eq!(response.order.items[0].quantity, 3);
    assert_eq!(response.order.items[0].price_unit, 2.50);
    assert_eq!(response.order.items[0].subtotal, 7.50);
    assert_eq!(response.summary, "3x Croissant");

    assert_eq!(stock_of(&h.state, croissant.id).await, 2);
}

#[tokio::test]
async fn empty_order_is_rejected_before_any_write() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;

    let err = assembly::create_order(&h.state, &user, &order_req(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = assembly::create_order(&h.state, &user, &order_req(vec![(1, 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(order_repo::find_all(&h.state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_stock_rolls_everything_back() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 2).await;

    let err = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(ref name) if name == "Croissant"));

    // Rollback atomicity: stock untouched, no order rows at all
    assert_eq!(stock_of(&h.state, croissant.id).await, 2);
    assert!(order_repo::find_all(&h.state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_product_mid_order_rolls_back_earlier_lines() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 5).await;

    let err = assembly::create_order(
        &h.state,
        &user,
        &order_req(vec![(croissant.id, 2), (999_999, 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // The croissant decrement from the first line was rolled back too
    assert_eq!(stock_of(&h.state, croissant.id).await, 5);
    assert!(order_repo::find_all(&h.state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_product_id_observes_its_own_decrement() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 5).await;

    // 3 + 3 over a stock of 5: the second occurrence must see stock 2
    let err = assembly::create_order(
        &h.state,
        &user,
        &order_req(vec![(croissant.id, 3), (croissant.id, 3)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));
    assert_eq!(stock_of(&h.state, croissant.id).await, 5);

    // 3 + 2 exactly drains it
    let response = assembly::create_order(
        &h.state,
        &user,
        &order_req(vec![(croissant.id, 3), (croissant.id, 2)]),
    )
    .await
    .unwrap();
    assert_eq!(response.order.items.len(), 2);
    assert_eq!(response.order.order.total, 12.50);
    assert_eq!(stock_of(&h.state, croissant.id).await, 0);
}

#[tokio::test]
async fn unit_price_is_snapshotted_at_creation() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 2)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    // Catalog price changes after the order was placed
    product_repo::update(
        &h.state.db,
        croissant.id,
        ProductUpdate {
            name: None,
            description: None,
            price: Some(99.0),
            stock: None,
            category: None,
            image_url: None,
            featured: None,
        },
    )
    .await
    .unwrap();

    let hydrated = order_repo::find_with_items(&h.state.db, order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hydrated.items[0].price_unit, 2.50);
    assert_eq!(hydrated.items[0].product_price, 99.0);
    assert_eq!(hydrated.order.total, 5.0);
}

// =============================================================================
// Modify order (owner, pending only)
// =============================================================================

#[tokio::test]
async fn quantity_zero_removes_line_and_recomputes_total() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;
    let baguette = product(&h.state, "Baguette", 1.20, 10).await;

    let created = assembly::create_order(
        &h.state,
        &user,
        &order_req(vec![(croissant.id, 2), (baguette.id, 3)]),
    )
    .await
    .unwrap();
    let order_id = created.order.order.id;
    assert_eq!(created.order.order.total, 8.60);

    let line = created
        .order
        .items
        .iter()
        .find(|i| i.product_id == baguette.id)
        .unwrap();

    let modified = lifecycle::modify_order(
        &h.state,
        &user,
        order_id,
        &ModifyOrderRequest {
            cancel: false,
            delivery_address: None,
            items: Some(vec![ItemQuantityUpdate {
                id: line.id,
                quantity: 0,
            }]),
        },
    )
    .await
    .unwrap();

    assert_eq!(modified.items.len(), 1);
    assert_eq!(modified.order.total, 5.0);
}

#[tokio::test]
async fn quantity_update_uses_stored_snapshot_not_live_price() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;
    let line_id = created.order.items[0].id;

    // Catalog price doubles; the pending order must not care
    product_repo::update(
        &h.state.db,
        croissant.id,
        ProductUpdate {
            name: None,
            description: None,
            price: Some(5.0),
            stock: None,
            category: None,
            image_url: None,
            featured: None,
        },
    )
    .await
    .unwrap();

    let modified = lifecycle::modify_order(
        &h.state,
        &user,
        order_id,
        &ModifyOrderRequest {
            cancel: false,
            delivery_address: None,
            items: Some(vec![ItemQuantityUpdate {
                id: line_id,
                quantity: 4,
            }]),
        },
    )
    .await
    .unwrap();

    assert_eq!(modified.items[0].subtotal, 10.0); // 4 × 2.50, not 4 × 5.00
    assert_eq!(modified.order.total, 10.0);
}

#[tokio::test]
async fn only_the_owner_may_modify() {
    let h = setup().await;
    let ana = customer(&h.state, "ana@test.local").await;
    let luis = customer(&h.state, "luis@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &ana, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();

    let err = lifecycle::modify_order(
        &h.state,
        &luis,
        created.order.order.id,
        &ModifyOrderRequest {
            cancel: true,
            delivery_address: None,
            items: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn non_pending_orders_cannot_be_modified() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap();

    let err = lifecycle::modify_order(
        &h.state,
        &user,
        order_id,
        &ModifyOrderRequest {
            cancel: false,
            delivery_address: Some("Calle Mayor 1".to_string()),
            items: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotModifiable(_)));
}

#[tokio::test]
async fn cancel_works_only_while_pending() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    // Pending order cancels fine
    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let cancelled = lifecycle::modify_order(
        &h.state,
        &user,
        created.order.order.id,
        &ModifyOrderRequest {
            cancel: true,
            delivery_address: None,
            items: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);

    // A delivered order does not
    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;
    for status in ["received", "preparing", "ready", "delivered"] {
        lifecycle::update_status(
            &h.state,
            &staff,
            order_id,
            &UpdateStatusRequest {
                status: status.to_string(),
                reason: None,
                estimated_time: None,
            },
        )
        .await
        .unwrap();
    }

    let err = lifecycle::modify_order(
        &h.state,
        &user,
        order_id,
        &ModifyOrderRequest {
            cancel: true,
            delivery_address: None,
            items: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotModifiable(_)));
}

// =============================================================================
// Lifecycle transitions
// =============================================================================

#[tokio::test]
async fn unknown_status_is_rejected() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();

    let err = lifecycle::update_status(
        &h.state,
        &staff,
        created.order.order.id,
        &UpdateStatusRequest {
            status: "sent".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn status_updates_are_admin_only() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();

    let err = lifecycle::update_status(
        &h.state,
        &user,
        created.order.order.id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn reject_requires_and_stores_reason_reopen_clears_it() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    // No reason → rejected transition refused
    let err = lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "rejected".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // With a reason it sticks
    let rejected = lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "rejected".to_string(),
            reason: Some("out of stock".to_string()),
            estimated_time: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(rejected.order.status, OrderStatus::Rejected);
    assert_eq!(rejected.order.rejection_reason.as_deref(), Some("out of stock"));

    // Re-opening into received clears the stored reason
    let reopened = lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(reopened.order.status, OrderStatus::Received);
    assert_eq!(reopened.order.rejection_reason, None);
}

#[tokio::test]
async fn estimated_time_rides_on_a_status_update() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();

    let updated = lifecycle::update_status(
        &h.state,
        &staff,
        created.order.order.id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: Some(30),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.order.estimated_time, Some(30));
}

#[tokio::test]
async fn emails_fire_on_received_and_ready_only() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    for status in ["received", "preparing", "ready", "delivered"] {
        lifecycle::update_status(
            &h.state,
            &staff,
            order_id,
            &UpdateStatusRequest {
                status: status.to_string(),
                reason: None,
                estimated_time: None,
            },
        )
        .await
        .unwrap();
    }

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "ana@test.local");
    assert!(sent[0].1.contains("received"));
    assert_eq!(sent[1].0, "ana@test.local");
    assert!(sent[1].2.contains("ready for pickup"));
}

#[tokio::test]
async fn lifecycle_changes_and_deletes_are_broadcast() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    let mut rx = h.state.events.subscribe();

    lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event, shared::events::ORDERS_UPDATED);
    assert_eq!(event.data, format!(r#"{{"id":"{order_id}"}}"#));

    lifecycle::delete_order(&h.state, &staff, order_id).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.data, format!(r#"{{"id":"{order_id}"}}"#));
}

// =============================================================================
// Visibility and deletion
// =============================================================================

#[tokio::test]
async fn only_owner_or_admin_can_read_an_order() {
    let h = setup().await;
    let ana = customer(&h.state, "ana@test.local").await;
    let luis = customer(&h.state, "luis@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    let created = assembly::create_order(&h.state, &ana, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;

    assert!(lifecycle::get_order(&h.state, &ana, order_id).await.is_ok());
    assert!(lifecycle::get_order(&h.state, &staff, order_id).await.is_ok());

    let err = lifecycle::get_order(&h.state, &luis, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn owner_deletes_only_pending_admin_deletes_anything() {
    let h = setup().await;
    let user = customer(&h.state, "ana@test.local").await;
    let other = customer(&h.state, "luis@test.local").await;
    let staff = admin(&h.state).await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    // Stranger cannot delete
    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;
    let err = lifecycle::delete_order(&h.state, &other, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Owner can, while pending
    lifecycle::delete_order(&h.state, &user, order_id).await.unwrap();
    assert!(
        order_repo::find_with_items(&h.state.db, order_id)
            .await
            .unwrap()
            .is_none()
    );

    // Once the order moves on, only the admin can delete it
    let created = assembly::create_order(&h.state, &user, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    let order_id = created.order.order.id;
    lifecycle::update_status(
        &h.state,
        &staff,
        order_id,
        &UpdateStatusRequest {
            status: "received".to_string(),
            reason: None,
            estimated_time: None,
        },
    )
    .await
    .unwrap();

    let err = lifecycle::delete_order(&h.state, &user, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    lifecycle::delete_order(&h.state, &staff, order_id).await.unwrap();
    assert!(
        order_repo::find_with_items(&h.state.db, order_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let h = setup().await;
    let ana = customer(&h.state, "ana@test.local").await;
    let luis = customer(&h.state, "luis@test.local").await;
    let croissant = product(&h.state, "Croissant", 2.50, 10).await;

    assembly::create_order(&h.state, &ana, &order_req(vec![(croissant.id, 1)]))
        .await
        .unwrap();
    assembly::create_order(&h.state, &luis, &order_req(vec![(croissant.id, 2)]))
        .await
        .unwrap();

    let mine = order_repo::find_by_user(&h.state.db, ana.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order.user_id, ana.id);

    let all = order_repo::find_all(&h.state.db).await.unwrap();
    assert_eq!(all.len(), 2);
}
