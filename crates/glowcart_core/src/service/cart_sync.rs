//! Local/server cart reconciliation.
//!
//! # Responsibility
//! - Merge the persisted local cart with the server cart on login.
//! - Report which rows the server still needs to learn about, including
//!   rows where it holds more units than the local cart kept.
//!
//! # Invariants
//! - Server rows are the baseline; server-only rows are always kept.
//! - For shared ids, a dirty local cart wins, a clean one defers to the server.
//! - Local-only rows survive only when the local cart is dirty.
//! - Output never contains duplicate ids or zero quantities.

use crate::model::cart::{CartItem, CartItemId};
use std::collections::HashMap;

/// How a push brings the server row in line with the merged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Add `quantity` units on top of the server row.
    TopUp,
    /// Remove the server row, then add it back with `quantity` units.
    Replace,
}

/// Correction the server needs for one row after a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartPush {
    pub item_id: CartItemId,
    pub product_id: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub mode: PushMode,
    /// `TopUp`: `local - server`. `Replace`: the local quantity. Always > 0.
    pub quantity: u32,
}

/// Merge result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartMerge {
    pub items: Vec<CartItem>,
    /// Rows where the local side won and the server disagrees.
    pub pushes: Vec<CartPush>,
    /// Shared ids whose quantities disagreed.
    pub conflicts: usize,
    /// Local-only rows dropped because the local cart was clean.
    pub dropped_local: usize,
}

/// Merges `local` into the `server` baseline.
///
/// `local_dirty` tells whether the local cart changed since the last sync.
/// Rows are ordered server-first, then local-only rows in local order.
/// Duplicate server ids are folded by summing their quantities.
pub fn merge_carts(local: &[CartItem], local_dirty: bool, server: &[CartItem]) -> CartMerge {
    let mut merge = CartMerge::default();
    let mut index_by_id: HashMap<CartItemId, usize> = HashMap::new();

    for row in server {
        if let Some(&index) = index_by_id.get(&row.id) {
            if let Some(existing) = merge.items.get_mut(index) {
                existing.quantity = existing.quantity.saturating_add(row.quantity);
            }
            continue;
        }
        index_by_id.insert(row.id.clone(), merge.items.len());
        merge.items.push(row.clone());
    }

    for local_row in local {
        match index_by_id.get(&local_row.id) {
            Some(&index) => {
                let Some(merged) = merge.items.get_mut(index) else {
                    continue;
                };
                if merged.quantity == local_row.quantity {
                    continue;
                }
                merge.conflicts += 1;
                if local_dirty {
                    let push = if local_row.quantity > merged.quantity {
                        push_for(
                            local_row,
                            PushMode::TopUp,
                            local_row.quantity - merged.quantity,
                        )
                    } else {
                        push_for(local_row, PushMode::Replace, local_row.quantity)
                    };
                    merge.pushes.push(push);
                    merged.quantity = local_row.quantity;
                }
            }
            None if local_dirty => {
                index_by_id.insert(local_row.id.clone(), merge.items.len());
                merge.items.push(local_row.clone());
                merge
                    .pushes
                    .push(push_for(local_row, PushMode::TopUp, local_row.quantity));
            }
            None => merge.dropped_local += 1,
        }
    }

    merge.items.retain(|item| item.quantity > 0);
    merge
}

fn push_for(item: &CartItem, mode: PushMode, quantity: u32) -> CartPush {
    CartPush {
        item_id: item.id.clone(),
        product_id: item.product_id.clone(),
        size: item.size.clone(),
        color: item.color.clone(),
        mode,
        quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_carts, PushMode};
    use crate::model::cart::CartItem;
    use rust_decimal::Decimal;

    fn item(product: &str, quantity: u32) -> CartItem {
        CartItem::new(product, product, product, Decimal::new(1000, 2), quantity)
    }

    #[test]
    fn dirty_local_quantity_wins_for_shared_id() {
        let merge = merge_carts(&[item("x", 2)], true, &[item("x", 1)]);
        assert_eq!(merge.items.len(), 1);
        assert_eq!(merge.items[0].quantity, 2);
        assert_eq!(merge.conflicts, 1);
        assert_eq!(merge.pushes.len(), 1);
        assert_eq!(merge.pushes[0].quantity, 1);
        assert_eq!(merge.pushes[0].mode, PushMode::TopUp);
    }

    #[test]
    fn clean_local_defers_to_server() {
        let merge = merge_carts(&[item("x", 2), item("gone", 1)], false, &[item("x", 5)]);
        assert_eq!(merge.items.len(), 1);
        assert_eq!(merge.items[0].quantity, 5);
        assert_eq!(merge.dropped_local, 1);
        assert!(merge.pushes.is_empty());
    }

    #[test]
    fn guest_cart_survives_empty_server_cart() {
        let merge = merge_carts(&[item("a", 1), item("b", 3)], true, &[]);
        let ids: Vec<&str> = merge.items.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(merge.pushes.len(), 2);
    }

    #[test]
    fn server_rows_come_first_and_duplicates_fold() {
        let merge = merge_carts(
            &[item("local", 1)],
            true,
            &[item("s1", 1), item("s2", 2), item("s1", 4)],
        );
        let rows: Vec<(&str, u32)> = merge
            .items
            .iter()
            .map(|row| (row.id.as_str(), row.quantity))
            .collect();
        assert_eq!(rows, vec![("s1", 5), ("s2", 2), ("local", 1)]);
    }

    #[test]
    fn dirty_local_lower_quantity_wins_with_replace_push() {
        let merge = merge_carts(&[item("x", 1)], true, &[item("x", 3)]);
        assert_eq!(merge.items[0].quantity, 1);
        assert_eq!(merge.pushes.len(), 1);
        assert_eq!(merge.pushes[0].mode, PushMode::Replace);
        assert_eq!(merge.pushes[0].quantity, 1);
    }
}
