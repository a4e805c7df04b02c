//! SQLite storage for products, carts and tickets

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Cart, CartItem, NewProduct, Product, Purchase, Ticket};
use crate::db::{is_constraint_violation, Database, StoreError, StoreResult};

const PRODUCT_COLUMNS: &str = "id, title, description, code, price_cents, stock";

pub struct CartDatabase {
    db: Database,
}

impl CartDatabase {
    /// Wrap a database and make sure the shop tables exist
    pub fn new(db: Database) -> StoreResult<Self> {
        let carts = Self { db };
        carts.init_tables()?;
        Ok(carts)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::new(Database::in_memory()?)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let conn = self.db.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                code TEXT UNIQUE NOT NULL,
                price_cents INTEGER NOT NULL,
                stock INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS carts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cart_items (
                cart_id TEXT NOT NULL,
                product_id TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (typeof(quantity) = 'integer' AND quantity > 0),
                PRIMARY KEY (cart_id, product_id),
                FOREIGN KEY (cart_id) REFERENCES carts(id) ON DELETE CASCADE,
                FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                code TEXT UNIQUE NOT NULL,
                purchase_datetime TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                purchaser TEXT NOT NULL,
                cart_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_carts_owner ON carts(owner_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== Product Operations ====================

    pub fn create_product(&self, fields: NewProduct) -> StoreResult<Product> {
        let product = Product {
            id: uuid::Uuid::new_v4().to_string(),
            title: fields.title,
            description: fields.description,
            code: fields.code,
            price_cents: fields.price_cents,
            stock: fields.stock,
        };

        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO products (id, title, description, code, price_cents, stock)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                product.id,
                product.title,
                product.description,
                product.code,
                product.price_cents,
                product.stock,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::DuplicateCode
            } else {
                StoreError::Sqlite(e)
            }
        })?;
        Ok(product)
    }

    pub fn find_product(&self, id: &str) -> StoreResult<Option<Product>> {
        let conn = self.db.lock()?;
        let product = conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    pub fn list_products(&self) -> StoreResult<Vec<Product>> {
        let conn = self.db.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY title"))?;
        let products = stmt
            .query_map([], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    // ==================== Cart Operations ====================

    pub fn create_cart(&self, owner_id: &str) -> StoreResult<Cart> {
        let cart = Cart {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            items: Vec::new(),
        };
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO carts (id, owner_id, created_at) VALUES (?1, ?2, ?3)",
            params![cart.id, cart.owner_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(cart)
    }

    /// Cart with its items, only if it belongs to `owner_id`
    pub fn find_cart(&self, cart_id: &str, owner_id: &str) -> StoreResult<Option<Cart>> {
        let conn = self.db.lock()?;
        let owned = conn
            .query_row(
                "SELECT id FROM carts WHERE id = ?1 AND owner_id = ?2",
                params![cart_id, owner_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if owned.is_none() {
            return Ok(None);
        }

        Ok(Some(Cart {
            id: cart_id.to_string(),
            owner_id: owner_id.to_string(),
            items: load_items(&conn, cart_id)?,
        }))
    }

    /// Add units of a product, merging with an existing line
    pub fn add_item(&self, cart_id: &str, product_id: &str, quantity: i64) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        merge_item(&tx, cart_id, product_id, quantity)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace every line of the cart at once
    pub fn replace_items(&self, cart_id: &str, items: &[(String, i64)]) -> StoreResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cart_items WHERE cart_id = ?1", params![cart_id])?;
        for (product_id, quantity) in items {
            merge_item(&tx, cart_id, product_id, *quantity)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Set the quantity of an existing line; zero removes it.
    /// Returns false when the product is not in the cart.
    pub fn set_quantity(&self, cart_id: &str, product_id: &str, quantity: i64) -> StoreResult<bool> {
        let conn = self.db.lock()?;
        let changed = if quantity == 0 {
            conn.execute(
                "DELETE FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
                params![cart_id, product_id],
            )?
        } else {
            conn.execute(
                "UPDATE cart_items SET quantity = ?3 WHERE cart_id = ?1 AND product_id = ?2",
                params![cart_id, product_id, quantity],
            )?
        };
        Ok(changed > 0)
    }

    /// Returns false when the product was not in the cart
    pub fn remove_item(&self, cart_id: &str, product_id: &str) -> StoreResult<bool> {
        let conn = self.db.lock()?;
        let removed = conn.execute(
            "DELETE FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
            params![cart_id, product_id],
        )?;
        Ok(removed > 0)
    }

    pub fn clear(&self, cart_id: &str) -> StoreResult<()> {
        let conn = self.db.lock()?;
        conn.execute("DELETE FROM cart_items WHERE cart_id = ?1", params![cart_id])?;
        Ok(())
    }

    // ==================== Purchase ====================

    /// Buy every line that has enough stock, in one transaction.
    ///
    /// Lines without enough stock stay in the cart and are reported back. A
    /// ticket is stored only when at least one line was bought. A total that
    /// does not fit in an `i64` aborts the purchase and nothing is written.
    pub fn purchase(&self, cart_id: &str, purchaser: &str) -> StoreResult<Purchase> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let lines: Vec<(String, i64, i64, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT ci.product_id, ci.quantity, p.stock, p.price_cents
                 FROM cart_items ci JOIN products p ON p.id = ci.product_id
                 WHERE ci.cart_id = ?1
                 ORDER BY p.title",
            )?;
            let rows = stmt
                .query_map(params![cart_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut amount_cents: i64 = 0;
        let mut bought = 0;
        let mut unavailable = Vec::new();
        for (product_id, quantity, stock, price_cents) in lines {
            if stock < quantity {
                unavailable.push(product_id);
                continue;
            }
            tx.execute(
                "UPDATE products SET stock = stock - ?1 WHERE id = ?2",
                params![quantity, product_id],
            )?;
            tx.execute(
                "DELETE FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
                params![cart_id, product_id],
            )?;
            amount_cents = price_cents
                .checked_mul(quantity)
                .and_then(|line| line.checked_add(amount_cents))
                .ok_or(StoreError::AmountOverflow)?;
            bought += 1;
        }

        let ticket = if bought > 0 {
            let ticket = Ticket {
                id: uuid::Uuid::new_v4().to_string(),
                code: uuid::Uuid::new_v4().simple().to_string(),
                purchase_datetime: chrono::Utc::now().to_rfc3339(),
                amount_cents,
                purchaser: purchaser.to_string(),
            };
            tx.execute(
                "INSERT INTO tickets (id, code, purchase_datetime, amount_cents, purchaser, cart_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ticket.id,
                    ticket.code,
                    ticket.purchase_datetime,
                    ticket.amount_cents,
                    ticket.purchaser,
                    cart_id,
                ],
            )?;
            Some(ticket)
        } else {
            None
        };

        tx.commit()?;
        Ok(Purchase {
            ticket,
            unavailable,
        })
    }
}

impl Clone for CartDatabase {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

/// Insert a line or add to the quantity already in the cart
fn merge_item(conn: &Connection, cart_id: &str, product_id: &str, quantity: i64) -> StoreResult<()> {
    let existing: i64 = conn
        .query_row(
            "SELECT quantity FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
            params![cart_id, product_id],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let total = existing
        .checked_add(quantity)
        .ok_or(StoreError::QuantityOverflow)?;

    conn.execute(
        "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES (?1, ?2, ?3)
         ON CONFLICT(cart_id, product_id) DO UPDATE SET quantity = excluded.quantity",
        params![cart_id, product_id, total],
    )?;
    Ok(())
}

fn load_items(conn: &Connection, cart_id: &str) -> StoreResult<Vec<CartItem>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.title, p.description, p.code, p.price_cents, p.stock, ci.quantity
         FROM cart_items ci JOIN products p ON p.id = ci.product_id
         WHERE ci.cart_id = ?1
         ORDER BY p.title",
    )?;
    let items = stmt
        .query_map(params![cart_id], |row| {
            Ok(CartItem {
                product: product_from_row(row)?,
                quantity: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        code: row.get(3)?,
        price_cents: row.get(4)?,
        stock: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn product(store: &CartDatabase, code: &str, price_cents: i64, stock: i64) -> Product {
        store
            .create_product(NewProduct {
                title: format!("Product {code}"),
                description: String::new(),
                code: code.to_string(),
                price_cents,
                stock,
            })
            .unwrap()
    }

    #[test]
    fn test_products() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 1200, 3);

        assert_eq!(store.find_product(&mug.id).unwrap(), Some(mug.clone()));
        assert_eq!(store.list_products().unwrap(), vec![mug]);
        assert!(store.find_product("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_product_code() {
        let store = CartDatabase::in_memory().unwrap();
        product(&store, "MUG", 1200, 3);
        let err = store
            .create_product(NewProduct {
                title: "Other".to_string(),
                description: String::new(),
                code: "MUG".to_string(),
                price_cents: 1,
                stock: 1,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode));
    }

    #[test]
    fn test_cart_belongs_to_owner() {
        let store = CartDatabase::in_memory().unwrap();
        let cart = store.create_cart("alice").unwrap();

        assert!(store.find_cart(&cart.id, "alice").unwrap().is_some());
        assert!(store.find_cart(&cart.id, "bob").unwrap().is_none());
    }

    #[test]
    fn test_add_merges_lines() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 1200, 10);
        let cart = store.create_cart("alice").unwrap();

        store.add_item(&cart.id, &mug.id, 1).unwrap();
        store.add_item(&cart.id, &mug.id, 2).unwrap();

        let cart = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.quantity_of(&mug.id), Some(3));
    }

    #[test]
    fn test_replace_set_remove_clear() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 1200, 10);
        let tea = product(&store, "TEA", 500, 10);
        let cart = store.create_cart("alice").unwrap();

        store
            .replace_items(&cart.id, &[(mug.id.clone(), 2), (tea.id.clone(), 4)])
            .unwrap();
        assert!(store.set_quantity(&cart.id, &mug.id, 5).unwrap());
        assert!(store.remove_item(&cart.id, &tea.id).unwrap());
        assert!(!store.remove_item(&cart.id, &tea.id).unwrap());

        let loaded = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(loaded.quantity_of(&mug.id), Some(5));
        assert_eq!(loaded.quantity_of(&tea.id), None);

        assert!(store.set_quantity(&cart.id, &mug.id, 0).unwrap());
        assert!(!store.set_quantity(&cart.id, &mug.id, 2).unwrap());

        store.add_item(&cart.id, &tea.id, 1).unwrap();
        store.clear(&cart.id).unwrap();
        assert!(store.find_cart(&cart.id, "alice").unwrap().unwrap().items.is_empty());
    }

    #[test]
    fn test_purchase_keeps_understocked_lines() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 1200, 5);
        let tea = product(&store, "TEA", 500, 1);
        let cart = store.create_cart("alice").unwrap();
        store.add_item(&cart.id, &mug.id, 2).unwrap();
        store.add_item(&cart.id, &tea.id, 3).unwrap();

        let purchase = store.purchase(&cart.id, "alice@example.com").unwrap();

        let ticket = purchase.ticket.unwrap();
        assert_eq!(ticket.amount_cents, 2400);
        assert_eq!(ticket.purchaser, "alice@example.com");
        assert_eq!(purchase.unavailable, vec![tea.id.clone()]);

        assert_eq!(store.find_product(&mug.id).unwrap().unwrap().stock, 3);
        assert_eq!(store.find_product(&tea.id).unwrap().unwrap().stock, 1);

        let left = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(left.quantity_of(&mug.id), None);
        assert_eq!(left.quantity_of(&tea.id), Some(3));
    }

    #[test]
    fn test_purchase_with_nothing_available() {
        let store = CartDatabase::in_memory().unwrap();
        let tea = product(&store, "TEA", 500, 0);
        let cart = store.create_cart("alice").unwrap();
        store.add_item(&cart.id, &tea.id, 1).unwrap();

        let purchase = store.purchase(&cart.id, "alice@example.com").unwrap();
        assert!(purchase.ticket.is_none());
        assert_eq!(purchase.unavailable, vec![tea.id]);
    }

    #[test]
    fn test_merged_quantity_overflow_keeps_cart_readable() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 100, 5);
        let cart = store.create_cart("alice").unwrap();

        store.add_item(&cart.id, &mug.id, i64::MAX).unwrap();
        assert_matches!(
            store.add_item(&cart.id, &mug.id, i64::MAX),
            Err(StoreError::QuantityOverflow)
        );

        let found = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(found.quantity_of(&mug.id), Some(i64::MAX));
    }

    #[test]
    fn test_replace_items_merges_duplicate_lines() {
        let store = CartDatabase::in_memory().unwrap();
        let mug = product(&store, "MUG", 100, 5);
        let cart = store.create_cart("alice").unwrap();

        store
            .replace_items(&cart.id, &[(mug.id.clone(), 2), (mug.id.clone(), 3)])
            .unwrap();
        let found = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(found.quantity_of(&mug.id), Some(5));

        assert_matches!(
            store.replace_items(&cart.id, &[(mug.id.clone(), i64::MAX), (mug.id.clone(), 1)]),
            Err(StoreError::QuantityOverflow)
        );
        let found = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(found.quantity_of(&mug.id), Some(5));
    }

    #[test]
    fn test_purchase_total_overflow_rolls_back() {
        let store = CartDatabase::in_memory().unwrap();
        let bulk = product(&store, "BULK", 100, i64::MAX);
        let cart = store.create_cart("alice").unwrap();
        store.add_item(&cart.id, &bulk.id, 100_000_000_000_000_000).unwrap();

        assert_matches!(
            store.purchase(&cart.id, "alice@example.com"),
            Err(StoreError::AmountOverflow)
        );

        assert_eq!(store.find_product(&bulk.id).unwrap().unwrap().stock, i64::MAX);
        let left = store.find_cart(&cart.id, "alice").unwrap().unwrap();
        assert_eq!(left.quantity_of(&bulk.id), Some(100_000_000_000_000_000));
    }
}
