//! Cart store: session source of truth for the shopping cart.
//!
//! # Responsibility
//! - Apply add/remove/update/clear mutations to the in-memory cart.
//! - Persist every mutation to the `cart` slot.
//! - Mirror adds, removes and quantity changes to the server cart for
//!   authenticated users.
//! - Reconcile with the server cart and run checkout.
//!
//! # Invariants
//! - Mutations always update memory, even when persistence fails.
//! - Mirror failures never block or roll back a local mutation.
//! - No row with `quantity == 0` is ever held or persisted.
//! - Cross-tab writes are last-writer-wins; `reload` picks up another
//!   writer's state.

use crate::api::{
    ApiError, CartMirrorRequest, CreateOrderRequest, OrderLineRequest, OrderReceipt, Session,
    StorefrontApi,
};
use crate::model::cart::{CartItem, CartSnapshot, ServerCartItem};
use crate::repo::slot_repo::{load_json, save_json, SlotStore, CART_SLOT};
use crate::repo::RepoError;
use crate::service::cart_sync::{merge_carts, CartPush, PushMode};
use log::{info, warn};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Soft warning: the mutation applied in memory but did not reach storage.
#[derive(Debug)]
pub struct CartWarning {
    pub operation: &'static str,
    pub source: RepoError,
}

impl Display for CartWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cart change was applied but could not be saved ({}): {}",
            self.operation, self.source
        )
    }
}

/// Outcome of a cart mutation.
#[derive(Debug, Default)]
#[must_use]
pub struct CartUpdate {
    /// Whether the cart content changed.
    pub changed: bool,
    pub warning: Option<CartWarning>,
}

/// Outcome of a server reconciliation.
#[derive(Debug, Default)]
#[must_use]
pub struct CartSyncReport {
    pub item_count: usize,
    pub conflicts: usize,
    pub pushed: usize,
    pub push_failures: usize,
    pub dropped_local: usize,
    pub warning: Option<CartWarning>,
}

/// Checkout failure. The cart is left untouched.
#[derive(Debug)]
pub enum CheckoutError {
    EmptyCart,
    NotAuthenticated,
    Api(ApiError),
}

impl Display for CheckoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCart => write!(f, "your cart is empty"),
            Self::NotAuthenticated => write!(f, "please sign in to check out"),
            Self::Api(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CheckoutError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

struct ServerBinding {
    api: Arc<dyn StorefrontApi>,
    session: Session,
}

/// Injectable cart store over any slot backend.
pub struct CartStore<S: SlotStore> {
    slots: S,
    snapshot: CartSnapshot,
    server: Option<ServerBinding>,
}

impl<S: SlotStore> CartStore<S> {
    /// Loads the persisted cart, starting empty when the slot is missing or
    /// unreadable.
    pub fn load(slots: S) -> Self {
        let snapshot = read_snapshot(&slots).unwrap_or_default();
        info!(
            "event=cart_load module=cart status=ok items={} dirty={}",
            snapshot.items.len(),
            snapshot.dirty
        );
        Self {
            slots,
            snapshot,
            server: None,
        }
    }

    /// Binds an authenticated session; subsequent adds/removes are mirrored.
    pub fn attach_session(&mut self, api: Arc<dyn StorefrontApi>, session: Session) {
        self.server = Some(ServerBinding { api, session });
    }

    /// Drops the session binding (logout). The local cart is kept.
    pub fn detach_session(&mut self) {
        self.server = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.server.is_some()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.snapshot.items
    }

    pub fn get(&self, id: &str) -> Option<&CartItem> {
        self.snapshot.items.iter().find(|item| item.id == id)
    }

    /// Total units across all rows.
    pub fn item_count(&self) -> u32 {
        self.snapshot
            .items
            .iter()
            .fold(0_u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn subtotal(&self) -> Decimal {
        self.snapshot.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_dirty(&self) -> bool {
        self.snapshot.dirty
    }

    pub fn last_synced_at_ms(&self) -> Option<i64> {
        self.snapshot.last_synced_at_ms
    }

    /// Adds a fully-formed row, merging into an existing row with the same
    /// composite id.
    pub fn add_item(&mut self, item: CartItem) -> CartUpdate {
        let incoming = item.quantity.max(1);
        match self
            .snapshot
            .items
            .iter_mut()
            .find(|existing| existing.id == item.id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(incoming),
            None => self.snapshot.items.push(CartItem {
                quantity: incoming,
                ..item.clone()
            }),
        }
        info!(
            "event=cart_add module=cart status=ok item_id={} quantity={}",
            item.id, incoming
        );

        let update = self.commit("add_item");
        self.mirror_add(&CartMirrorRequest {
            product_id: item.product_id,
            quantity: incoming,
            size: item.size,
            color: item.color,
        });
        update
    }

    /// Removes the row with `id`; no-op when absent.
    pub fn remove_item(&mut self, id: &str) -> CartUpdate {
        let before = self.snapshot.items.len();
        self.snapshot.items.retain(|item| item.id != id);
        if self.snapshot.items.len() == before {
            return CartUpdate::default();
        }
        info!("event=cart_remove module=cart status=ok item_id={id}");

        let update = self.commit("remove_item");
        self.mirror_remove(id);
        update
    }

    /// Applies `delta` to a row's quantity, clamped to a minimum of 1.
    ///
    /// Never deletes; `remove_item` is the only path to deletion.
    pub fn update_quantity(&mut self, id: &str, delta: i32) -> CartUpdate {
        let Some(item) = self.snapshot.items.iter_mut().find(|item| item.id == id) else {
            return CartUpdate::default();
        };
        let next = (i64::from(item.quantity) + i64::from(delta)).clamp(1, i64::from(u32::MAX));
        let next = u32::try_from(next).unwrap_or(u32::MAX);
        if next == item.quantity {
            return CartUpdate::default();
        }
        let push = CartPush {
            item_id: item.id.clone(),
            product_id: item.product_id.clone(),
            size: item.size.clone(),
            color: item.color.clone(),
            mode: if next > item.quantity {
                PushMode::TopUp
            } else {
                PushMode::Replace
            },
            quantity: if next > item.quantity {
                next - item.quantity
            } else {
                next
            },
        };
        item.quantity = next;
        info!("event=cart_update_quantity module=cart status=ok item_id={id} quantity={next}");

        let update = self.commit("update_quantity");
        if self.server.is_some() {
            // A failed mirror leaves the cart dirty; the next sync corrects it.
            let _ = self.push_to_server(&push);
        }
        update
    }

    /// Empties the cart.
    pub fn clear_cart(&mut self) -> CartUpdate {
        if self.snapshot.items.is_empty() {
            return CartUpdate::default();
        }
        self.snapshot.items.clear();
        info!("event=cart_clear module=cart status=ok");
        self.commit("clear_cart")
    }

    /// Re-reads the persisted slot, replacing in-memory state.
    ///
    /// Keeps the current state when the slot cannot be read.
    pub fn reload(&mut self) -> Result<(), RepoError> {
        match load_json::<CartSnapshot>(&self.slots, CART_SLOT) {
            Ok(snapshot) => {
                self.snapshot = sanitize(snapshot.unwrap_or_default());
                Ok(())
            }
            Err(err) => {
                warn!("event=cart_reload module=cart status=error error={err}");
                Err(err)
            }
        }
    }

    /// Merges the server's cart rows into the local cart.
    ///
    /// Policy: see `service::cart_sync::merge_carts`. Rows the local side won
    /// are pushed back best-effort when a session is attached; push failures
    /// are counted and logged, never retried here.
    pub fn sync_with_database(&mut self, server_items: Vec<ServerCartItem>) -> CartSyncReport {
        let server_rows: Vec<CartItem> = server_items
            .into_iter()
            .filter_map(ServerCartItem::into_cart_item)
            .collect();
        let merge = merge_carts(&self.snapshot.items, self.snapshot.dirty, &server_rows);
        if merge.conflicts > 0 {
            info!(
                "event=cart_sync_conflict module=cart status=resolved conflicts={} local_wins={}",
                merge.conflicts, self.snapshot.dirty
            );
        }

        self.snapshot.items = merge.items;
        self.snapshot.dirty = false;
        self.snapshot.last_synced_at_ms = Some(now_epoch_ms());
        let warning = self.persist("sync_with_database");

        let mut push_failures = 0;
        for push in &merge.pushes {
            if !self.push_to_server(push) {
                push_failures += 1;
            }
        }
        if push_failures > 0 {
            // Unpushed rows must win again at the next sync.
            self.snapshot.dirty = true;
            if let Err(err) = save_json(&self.slots, CART_SLOT, &self.snapshot) {
                warn!("event=cart_persist module=cart status=error operation=sync_mark_dirty error={err}");
            }
        }

        info!(
            "event=cart_sync module=cart status=ok items={} pushed={} push_failures={} dropped_local={}",
            self.snapshot.items.len(),
            merge.pushes.len() - push_failures,
            push_failures,
            merge.dropped_local
        );

        CartSyncReport {
            item_count: self.snapshot.items.len(),
            conflicts: merge.conflicts,
            pushed: merge.pushes.len() - push_failures,
            push_failures,
            dropped_local: merge.dropped_local,
            warning,
        }
    }

    /// Fetches the server cart for the attached session and merges it.
    ///
    /// # Errors
    /// - `CheckoutError::NotAuthenticated` without a session.
    /// - `CheckoutError::Api` when the fetch fails; the local cart is kept.
    pub fn sync_from_server(&mut self) -> Result<CartSyncReport, CheckoutError> {
        let binding = self.server.as_ref().ok_or(CheckoutError::NotAuthenticated)?;
        let rows = binding
            .api
            .fetch_cart(&binding.session)
            .map_err(|err| {
                warn!(
                    "event=cart_sync module=cart status=error error_code={}",
                    err.code
                );
                CheckoutError::Api(err)
            })?;
        Ok(self.sync_with_database(rows))
    }

    /// Places an order from the reconciled cart and clears it on success.
    pub fn checkout(&mut self) -> Result<(OrderReceipt, CartUpdate), CheckoutError> {
        if self.snapshot.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let binding = self.server.as_ref().ok_or(CheckoutError::NotAuthenticated)?;
        let request = CreateOrderRequest {
            items: self
                .snapshot
                .items
                .iter()
                .map(|item| OrderLineRequest {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price,
                    size: item.size.clone(),
                    color: item.color.clone(),
                })
                .collect(),
        };

        let receipt = binding
            .api
            .create_order(&binding.session, &request)
            .map_err(|err| {
                warn!(
                    "event=cart_checkout module=cart status=error error_code={}",
                    err.code
                );
                CheckoutError::Api(err)
            })?;

        info!(
            "event=cart_checkout module=cart status=ok order_id={} lines={}",
            receipt.id,
            request.items.len()
        );
        self.snapshot.items.clear();
        self.snapshot.dirty = false;
        let update = CartUpdate {
            changed: true,
            warning: self.persist("checkout"),
        };
        Ok((receipt, update))
    }

    fn commit(&mut self, operation: &'static str) -> CartUpdate {
        self.snapshot.dirty = true;
        CartUpdate {
            changed: true,
            warning: self.persist(operation),
        }
    }

    fn persist(&self, operation: &'static str) -> Option<CartWarning> {
        match save_json(&self.slots, CART_SLOT, &self.snapshot) {
            Ok(()) => None,
            Err(source) => {
                warn!(
                    "event=cart_persist module=cart status=error operation={operation} error={source}"
                );
                Some(CartWarning { operation, source })
            }
        }
    }

    fn mirror_add(&self, request: &CartMirrorRequest) {
        let Some(binding) = &self.server else {
            return;
        };
        if let Err(err) = binding.api.add_cart_item(&binding.session, request) {
            warn!(
                "event=cart_mirror module=cart status=error operation=add product_id={} error_code={}",
                request.product_id, err.code
            );
        }
    }

    fn mirror_remove(&self, id: &str) {
        let Some(binding) = &self.server else {
            return;
        };
        if let Err(err) = binding.api.remove_cart_item(&binding.session, id) {
            warn!(
                "event=cart_mirror module=cart status=error operation=remove item_id={id} error_code={}",
                err.code
            );
        }
    }

    fn push_to_server(&self, push: &CartPush) -> bool {
        let Some(binding) = &self.server else {
            return false;
        };
        if push.mode == PushMode::Replace {
            if let Err(err) = binding.api.remove_cart_item(&binding.session, &push.item_id) {
                warn!(
                    "event=cart_sync_push module=cart status=error mode=replace item_id={} error_code={}",
                    push.item_id, err.code
                );
                return false;
            }
        }
        let request = CartMirrorRequest {
            product_id: push.product_id.clone(),
            quantity: push.quantity,
            size: push.size.clone(),
            color: push.color.clone(),
        };
        match binding.api.add_cart_item(&binding.session, &request) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=cart_sync_push module=cart status=error item_id={} error_code={}",
                    push.item_id, err.code
                );
                false
            }
        }
    }
}

fn read_snapshot(slots: &impl SlotStore) -> Option<CartSnapshot> {
    match load_json::<CartSnapshot>(slots, CART_SLOT) {
        Ok(snapshot) => snapshot.map(sanitize),
        Err(err) => {
            warn!("event=cart_load module=cart status=error error={err}");
            None
        }
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn sanitize(mut snapshot: CartSnapshot) -> CartSnapshot {
    snapshot.items.retain(|item| item.quantity > 0);
    snapshot
}
