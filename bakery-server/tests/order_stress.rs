//! Concurrency stress test for order creation.
//!
//! Many tasks race to buy the same product; the sum of decremented stock
//! must never exceed what was on the shelf, and every persisted order
//! must be complete. A task that loses the race fails cleanly (either
//! insufficient stock or a busy transaction) without leaving partial rows.

use tempfile::TempDir;

use bakery_server::db::DbService;
use bakery_server::db::repository::user::NewUser;
use bakery_server::db::repository::{order as order_repo, product as product_repo, user as user_repo};
use shared::models::{CreateOrderRequest, OrderItemInput, ProductCreate, Role};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let dir = TempDir::new().expect("temp dir");
    let db = DbService::new(&dir.path().join("stress.db").to_string_lossy())
        .await
        .expect("test database");
    let pool = db.pool;

    let user = user_repo::create(
        &pool,
        NewUser {
            name: "Cliente".to_string(),
            email: "stress@test.local".to_string(),
            hash_pass: "not-a-real-hash".to_string(),
            role: Role::Customer,
            phone: None,
            address: None,
        },
    )
    .await
    .expect("create user");

    let product = product_repo::create(
        &pool,
        ProductCreate {
            name: "Tarta de Santiago".to_string(),
            description: None,
            price: 18.0,
            stock: 5,
            category: None,
            image_url: None,
            featured: None,
        },
    )
    .await
    .expect("create product");

    // 8 buyers, 2 units each, 5 on the shelf: at most 2 can win
    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let user_id = user.id;
        let product_id = product.id;
        handles.push(tokio::spawn(async move {
            let req = CreateOrderRequest {
                items: vec![OrderItemInput {
                    product_id,
                    quantity: 2,
                }],
                payment_method: "card".to_string(),
                is_delivery: false,
                delivery_address: None,
            };
            order_repo::create(&pool, user_id, &req).await
        }));
    }

    let mut successes: usize = 0;
    for handle in handles {
        if handle.await.expect("task panicked").is_ok() {
            successes += 1;
        }
    }

    let remaining = product_repo::find_by_id(&pool, product.id)
        .await
        .unwrap()
        .unwrap()
        .stock;

    assert!((1..=2).contains(&successes), "successes = {successes}");
    assert_eq!(remaining, 5 - 2 * successes as i64);
    assert!(remaining >= 0, "stock went negative: {remaining}");

    // No partial orders: every visible order has its line and total
    let orders = order_repo::find_all(&pool).await.unwrap();
    assert_eq!(orders.len(), successes);
    for order in &orders {
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.order.total, 36.0);
    }
}

#[tokio::test]
async fn sequential_orders_drain_stock_exactly() {
    let dir = TempDir::new().expect("temp dir");
    let db = DbService::new(&dir.path().join("drain.db").to_string_lossy())
        .await
        .expect("test database");
    let pool = db.pool;

    let user = user_repo::create(
        &pool,
        NewUser {
            name: "Cliente".to_string(),
            email: "drain@test.local".to_string(),
            hash_pass: "not-a-real-hash".to_string(),
            role: Role::Customer,
            phone: None,
            address: None,
        },
    )
    .await
    .unwrap();

    let product = product_repo::create(
        &pool,
        ProductCreate {
            name: "Pan de centeno".to_string(),
            description: None,
            price: 3.10,
            stock: 3,
            category: None,
            image_url: None,
            featured: None,
        },
    )
    .await
    .unwrap();

    let req = CreateOrderRequest {
        items: vec![OrderItemInput {
            product_id: product.id,
            quantity: 1,
        }],
        payment_method: "cash".to_string(),
        is_delivery: false,
        delivery_address: None,
    };

    for _ in 0..3 {
        order_repo::create(&pool, user.id, &req).await.unwrap();
    }

    // Shelf is empty now
    let err = order_repo::create(&pool, user.id, &req).await.unwrap_err();
    assert!(matches!(
        err,
        bakery_server::db::repository::RepoError::InsufficientStock(_)
    ));

    let remaining = product_repo::find_by_id(&pool, product.id)
        .await
        .unwrap()
        .unwrap()
        .stock;
    assert_eq!(remaining, 0);
    assert_eq!(order_repo::find_all(&pool).await.unwrap().len(), 3);
}
