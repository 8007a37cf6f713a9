use std::collections::BTreeSet;

use capo_core::error::CapoError;
use capo_core::objects::{TxOutputId, Utxo};

use crate::context::TxContext;

/// Index of a context within a `TxContextTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TcxId(usize);

#[derive(Debug)]
struct Node {
    /// None once the context has been taken out for submission
    ctx: Option<TxContext>,
    parent: Option<TcxId>,
    /// Reservations of a taken context, kept so siblings still avoid them
    taken_reserved: BTreeSet<TxOutputId>,
}

/// Arena of transaction contexts composed into parent/child trees.
///
/// Nodes refer to their parent by index only. Reservation queries walk the
/// tree explicitly: a child's claimed inputs count as claimed for its
/// ancestors, and every node in a tree sees the claims of the whole tree, so
/// sibling compositions never pick the same spare input.
#[derive(Debug, Default)]
pub struct TxContextTree {
    nodes: Vec<Node>,
}

impl TxContextTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level context
    pub fn root(&mut self, ctx: TxContext) -> TcxId {
        self.push(ctx, None)
    }

    /// Add a context composed under `parent`
    pub fn child(&mut self, parent: TcxId, ctx: TxContext) -> Result<TcxId, CapoError> {
        if parent.0 >= self.nodes.len() {
            return Err(CapoError::NotFound(format!("parent context {:?}", parent)));
        }
        Ok(self.push(ctx, Some(parent)))
    }

    fn push(&mut self, ctx: TxContext, parent: Option<TcxId>) -> TcxId {
        self.nodes.push(Node {
            ctx: Some(ctx),
            parent,
            taken_reserved: BTreeSet::new(),
        });
        TcxId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: TcxId) -> Option<&TxContext> {
        self.nodes.get(id.0).and_then(|n| n.ctx.as_ref())
    }

    pub fn get_mut(&mut self, id: TcxId) -> Option<&mut TxContext> {
        self.nodes.get_mut(id.0).and_then(|n| n.ctx.as_mut())
    }

    pub fn parent(&self, id: TcxId) -> Option<TcxId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// The top-level ancestor of `id`
    pub fn root_of(&self, id: TcxId) -> TcxId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    fn is_descendant(&self, id: TcxId, ancestor: TcxId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn own_reserved(&self, id: TcxId) -> BTreeSet<TxOutputId> {
        match self.nodes.get(id.0) {
            Some(Node { ctx: Some(ctx), .. }) => ctx.reserved_utxos(),
            Some(node) => node.taken_reserved.clone(),
            None => BTreeSet::new(),
        }
    }

    /// Inputs claimed by every context composed (directly or transitively) under `id`
    pub fn child_reserved_utxos(&self, id: TcxId) -> BTreeSet<TxOutputId> {
        (0..self.nodes.len())
            .map(TcxId)
            .filter(|node| self.is_descendant(*node, id))
            .flat_map(|node| self.own_reserved(node))
            .collect()
    }

    /// The full exclusion set for candidate-input searches anywhere in `id`'s tree
    pub fn reserved_utxos(&self, id: TcxId) -> BTreeSet<TxOutputId> {
        let root = self.root_of(id);
        let mut reserved = self.own_reserved(root);
        reserved.extend(self.child_reserved_utxos(root));
        reserved
    }

    /// First candidate not claimed anywhere in `id`'s tree that satisfies `predicate`
    pub fn find_spare_utxo<F>(&self, id: TcxId, candidates: &[Utxo], predicate: F) -> Option<Utxo>
    where
        F: Fn(&Utxo) -> bool,
    {
        let reserved = self.reserved_utxos(id);
        candidates
            .iter()
            .find(|u| !reserved.contains(&u.id) && predicate(u))
            .cloned()
    }

    /// Take a context out of the tree (e.g. to submit it); its claims stay recorded
    pub fn take(&mut self, id: TcxId) -> Option<TxContext> {
        let node = self.nodes.get_mut(id.0)?;
        let ctx = node.ctx.take()?;
        node.taken_reserved = ctx.reserved_utxos();
        Some(ctx)
    }

    /// Record what a taken context claimed after it left the tree (e.g. wallet inputs added by balancing)
    pub fn record_claims(&mut self, id: TcxId, ctx: &TxContext) -> Result<(), CapoError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| CapoError::NotFound(format!("context {:?}", id)))?;
        if node.ctx.is_some() {
            return Err(CapoError::InvalidState(format!(
                "context {:?} is still in the tree",
                id
            )));
        }
        node.taken_reserved.extend(ctx.reserved_utxos());
        Ok(())
    }
}
