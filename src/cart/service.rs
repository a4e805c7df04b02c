//! Cart operations on behalf of an authenticated identity

use super::{
    database::CartDatabase,
    error::CartError,
    models::{Cart, ItemRequest, NewProduct, Product, Purchase},
};
use crate::auth::{database::UserDatabase, models::Identity};

#[derive(Clone)]
pub struct CartService {
    carts: CartDatabase,
    users: UserDatabase,
}

impl CartService {
    pub fn new(carts: CartDatabase, users: UserDatabase) -> Self {
        Self { carts, users }
    }

    // ==================== Catalogue ====================

    pub fn create_product(&self, fields: NewProduct) -> Result<Product, CartError> {
        if fields.title.trim().is_empty() || fields.code.trim().is_empty() {
            return Err(CartError::InvalidProduct("title and code are required"));
        }
        if fields.price_cents < 0 || fields.stock < 0 {
            return Err(CartError::InvalidProduct("price and stock cannot be negative"));
        }
        Ok(self.carts.create_product(fields)?)
    }

    pub fn list_products(&self) -> Result<Vec<Product>, CartError> {
        Ok(self.carts.list_products()?)
    }

    pub fn get_product(&self, product_id: &str) -> Result<Product, CartError> {
        self.carts
            .find_product(product_id)?
            .ok_or(CartError::ProductNotFound)
    }

    // ==================== Carts ====================

    pub fn create_cart(&self, owner: &Identity) -> Result<Cart, CartError> {
        Ok(self.carts.create_cart(&owner.id)?)
    }

    pub fn get_cart(&self, owner: &Identity, cart_id: &str) -> Result<Cart, CartError> {
        self.carts
            .find_cart(cart_id, &owner.id)?
            .ok_or(CartError::CartNotFound)
    }

    pub fn add_product(
        &self,
        owner: &Identity,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity);
        }
        self.get_cart(owner, cart_id)?;
        self.get_product(product_id)?;
        self.carts.add_item(cart_id, product_id, quantity)?;
        self.get_cart(owner, cart_id)
    }

    pub fn replace_items(
        &self,
        owner: &Identity,
        cart_id: &str,
        items: Vec<ItemRequest>,
    ) -> Result<Cart, CartError> {
        self.get_cart(owner, cart_id)?;
        for item in &items {
            if item.quantity <= 0 {
                return Err(CartError::InvalidQuantity);
            }
            self.get_product(&item.product_id)?;
        }
        let lines: Vec<(String, i64)> = items
            .into_iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        self.carts.replace_items(cart_id, &lines)?;
        self.get_cart(owner, cart_id)
    }

    pub fn set_quantity(
        &self,
        owner: &Identity,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity);
        }
        self.get_cart(owner, cart_id)?;
        if !self.carts.set_quantity(cart_id, product_id, quantity)? {
            return Err(CartError::ItemNotFound);
        }
        self.get_cart(owner, cart_id)
    }

    pub fn remove_product(
        &self,
        owner: &Identity,
        cart_id: &str,
        product_id: &str,
    ) -> Result<Cart, CartError> {
        self.get_cart(owner, cart_id)?;
        if !self.carts.remove_item(cart_id, product_id)? {
            return Err(CartError::ItemNotFound);
        }
        self.get_cart(owner, cart_id)
    }

    pub fn clear(&self, owner: &Identity, cart_id: &str) -> Result<Cart, CartError> {
        self.get_cart(owner, cart_id)?;
        self.carts.clear(cart_id)?;
        self.get_cart(owner, cart_id)
    }

    /// The session token may be stale, so the purchaser is re-read from the
    /// user directory before a ticket is issued.
    pub fn purchase(&self, owner: &Identity, cart_id: &str) -> Result<Purchase, CartError> {
        self.get_cart(owner, cart_id)?;
        let purchaser = self
            .users
            .find_by_id(&owner.id)?
            .ok_or(CartError::UnknownPurchaser)?;

        let purchase = self.carts.purchase(cart_id, &purchaser.email)?;
        match purchase.ticket {
            Some(ref ticket) => {
                log::info!(
                    "Ticket {} issued to {} for {} cents",
                    ticket.code,
                    ticket.purchaser,
                    ticket.amount_cents
                );
                Ok(purchase)
            }
            None => Err(CartError::NothingPurchasable(purchase.unavailable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{NewIdentity, Role};
    use crate::db::Database;
    use assert_matches::assert_matches;

    fn setup() -> (CartService, Identity, Identity) {
        let db = Database::in_memory().unwrap();
        let users = UserDatabase::new(db.clone()).unwrap();
        let carts = CartDatabase::new(db).unwrap();

        let make = |email: &str| {
            users
                .create(NewIdentity {
                    first_name: "Shop".to_string(),
                    last_name: "Per".to_string(),
                    email: email.to_string(),
                    age: 30,
                    role: Role::User,
                    password_hash: None,
                })
                .unwrap()
        };
        let alice = make("alice@example.com");
        let bob = make("bob@example.com");
        (CartService::new(carts, users), alice, bob)
    }

    fn new_product(code: &str, price_cents: i64, stock: i64) -> NewProduct {
        NewProduct {
            title: code.to_string(),
            description: String::new(),
            code: code.to_string(),
            price_cents,
            stock,
        }
    }

    #[test]
    fn test_product_validation() {
        let (service, _, _) = setup();
        assert_matches!(
            service.create_product(new_product("", 100, 1)),
            Err(CartError::InvalidProduct(_))
        );
        assert_matches!(
            service.create_product(new_product("NEG", -1, 1)),
            Err(CartError::InvalidProduct(_))
        );
        service.create_product(new_product("OK", 100, 1)).unwrap();
        assert_matches!(
            service.create_product(new_product("OK", 100, 1)),
            Err(CartError::DuplicateCode)
        );
    }

    #[test]
    fn test_carts_are_private() {
        let (service, alice, bob) = setup();
        let cart = service.create_cart(&alice).unwrap();

        assert!(service.get_cart(&alice, &cart.id).is_ok());
        assert_matches!(service.get_cart(&bob, &cart.id), Err(CartError::CartNotFound));
        assert_matches!(service.clear(&bob, &cart.id), Err(CartError::CartNotFound));
    }

    #[test]
    fn test_cart_lifecycle() {
        let (service, alice, _) = setup();
        let mug = service.create_product(new_product("MUG", 1000, 5)).unwrap();
        let tea = service.create_product(new_product("TEA", 300, 5)).unwrap();
        let cart = service.create_cart(&alice).unwrap();

        let cart = service.add_product(&alice, &cart.id, &mug.id, 1).unwrap();
        assert_eq!(cart.quantity_of(&mug.id), Some(1));

        assert_matches!(
            service.add_product(&alice, &cart.id, "missing", 1),
            Err(CartError::ProductNotFound)
        );
        assert_matches!(
            service.add_product(&alice, &cart.id, &mug.id, 0),
            Err(CartError::InvalidQuantity)
        );

        let cart = service
            .replace_items(
                &alice,
                &cart.id,
                vec![ItemRequest {
                    product_id: tea.id.clone(),
                    quantity: 2,
                }],
            )
            .unwrap();
        assert_eq!(cart.quantity_of(&mug.id), None);
        assert_eq!(cart.quantity_of(&tea.id), Some(2));

        let cart = service.set_quantity(&alice, &cart.id, &tea.id, 4).unwrap();
        assert_eq!(cart.quantity_of(&tea.id), Some(4));
        assert_matches!(
            service.set_quantity(&alice, &cart.id, &mug.id, 1),
            Err(CartError::ItemNotFound)
        );
        assert_matches!(
            service.set_quantity(&alice, &cart.id, &tea.id, -1),
            Err(CartError::InvalidQuantity)
        );

        let cart = service.remove_product(&alice, &cart.id, &tea.id).unwrap();
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_purchase() {
        let (service, alice, _) = setup();
        let mug = service.create_product(new_product("MUG", 1000, 1)).unwrap();
        let cart = service.create_cart(&alice).unwrap();
        service.add_product(&alice, &cart.id, &mug.id, 1).unwrap();

        let purchase = service.purchase(&alice, &cart.id).unwrap();
        let ticket = purchase.ticket.unwrap();
        assert_eq!(ticket.amount_cents, 1000);
        assert_eq!(ticket.purchaser, "alice@example.com");

        service.add_product(&alice, &cart.id, &mug.id, 1).unwrap();
        assert_matches!(
            service.purchase(&alice, &cart.id),
            Err(CartError::NothingPurchasable(ids)) if ids == vec![mug.id.clone()]
        );
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        let (service, alice, _) = setup();
        let mug = service.create_product(new_product("MUG", 1000, 5)).unwrap();
        let cart = service.create_cart(&alice).unwrap();

        service.add_product(&alice, &cart.id, &mug.id, i64::MAX).unwrap();
        assert_matches!(
            service.add_product(&alice, &cart.id, &mug.id, 1),
            Err(CartError::InvalidQuantity)
        );
        let cart = service.get_cart(&alice, &cart.id).unwrap();
        assert_eq!(cart.quantity_of(&mug.id), Some(i64::MAX));
    }

    #[test]
    fn test_purchase_total_too_large() {
        let (service, alice, _) = setup();
        let bulk = service
            .create_product(new_product("BULK", 100, i64::MAX))
            .unwrap();
        let cart = service.create_cart(&alice).unwrap();
        service
            .add_product(&alice, &cart.id, &bulk.id, 100_000_000_000_000_000)
            .unwrap();

        assert_matches!(
            service.purchase(&alice, &cart.id),
            Err(CartError::TotalTooLarge)
        );
        assert_eq!(service.get_product(&bulk.id).unwrap().stock, i64::MAX);
    }

    #[test]
    fn test_purchase_by_deleted_identity() {
        let db = Database::in_memory().unwrap();
        let users = UserDatabase::new(db.clone()).unwrap();
        let service = CartService::new(CartDatabase::new(db).unwrap(), users);

        let ghost = Identity {
            id: "ghost".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: "ghost@example.com".to_string(),
            age: 0,
            role: Role::User,
            password_hash: None,
            created_at: String::new(),
        };
        let cart = service.create_cart(&ghost).unwrap();
        assert_matches!(
            service.purchase(&ghost, &cart.id),
            Err(CartError::UnknownPurchaser)
        );
    }
}
