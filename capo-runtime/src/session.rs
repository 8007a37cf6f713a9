use log::{info, warn};
use std::collections::BTreeSet;

use capo_core::config::NetworkParams;
use capo_core::error::CapoError;
use capo_core::ledger::{LedgerProvider, LedgerQuery, Signer};
use capo_core::objects::{Address, TxOutputId};
use capo_core::transaction::{SignedTransaction, Transaction, TxReceipt};
use capo_transaction::{TcxId, TxContext, TxContextTree};

use crate::submit::finalize;

/// Receipt of one transaction submitted by `Session::submit_all`
#[derive(Debug, Clone)]
pub struct SubmittedTx {
    /// `primary`, or the name the transaction was queued under
    pub name: String,
    pub description: String,
    pub receipt: TxReceipt,
}

/// An explicit connection to one network: its parameters, ledger, and wallet
pub struct Session<L: LedgerProvider> {
    params: NetworkParams,
    ledger: L,
    signer: Option<Box<dyn Signer>>,
}

impl<L: LedgerProvider> Session<L> {
    /// Check the parameters against the ledger and open the session
    pub fn init(
        params: NetworkParams,
        ledger: L,
        signer: Option<Box<dyn Signer>>,
    ) -> Result<Self, CapoError> {
        params.validate()?;
        if ledger.network() != params.network {
            return Err(CapoError::Config(format!(
                "network params are for {:?} but the ledger is {:?}",
                params.network,
                ledger.network()
            )));
        }
        info!("session opened on {:?}", params.network);
        Ok(Self {
            params,
            ledger,
            signer,
        })
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// A fresh transaction context for this network
    pub fn tcx(&self) -> TxContext {
        TxContext::new(&self.params)
    }

    pub fn signer(&self) -> Result<&dyn Signer, CapoError> {
        self.signer
            .as_deref()
            .ok_or_else(|| CapoError::MissingActor("no wallet signer is configured".to_string()))
    }

    pub fn wallet_address(&self) -> Result<Address, CapoError> {
        Ok(self.signer()?.address())
    }

    /// Balance `tcx` from the wallet, avoiding `exclude`
    pub fn finalize(
        &self,
        tcx: &mut TxContext,
        exclude: &BTreeSet<TxOutputId>,
    ) -> Result<Transaction, CapoError> {
        let wallet = self.wallet_address()?;
        finalize(tcx, &self.ledger, &wallet, exclude)
    }

    /// Balance, sign and submit one transaction, ignoring its queued follow-ups
    pub fn submit(&mut self, tcx: &mut TxContext) -> Result<TxReceipt, CapoError> {
        self.submit_excluding(tcx, &BTreeSet::new())
    }

    /// Take context `id` out of `tree` and submit it.
    ///
    /// Balancing avoids every input claimed elsewhere in the tree, and the
    /// wallet inputs it adds are recorded as claims of `id`.
    pub fn submit_in(&mut self, tree: &mut TxContextTree, id: TcxId) -> Result<TxReceipt, CapoError> {
        let exclude = tree.reserved_utxos(id);
        let mut tcx = tree
            .take(id)
            .ok_or_else(|| CapoError::NotFound(format!("context {:?} in the tree", id)))?;
        let result = self.submit_excluding(&mut tcx, &exclude);
        tree.record_claims(id, &tcx)?;
        result
    }

    fn submit_excluding(
        &mut self,
        tcx: &mut TxContext,
        exclude: &BTreeSet<TxOutputId>,
    ) -> Result<TxReceipt, CapoError> {
        let tx = self.finalize(tcx, exclude)?;
        let signature = self.signer()?.sign(&tx)?;
        info!(
            "submitting {} ({} inputs, {} outputs, fee {})",
            tx.id,
            tx.inputs.len(),
            tx.outputs.len(),
            tx.fee
        );
        let mut signed = SignedTransaction::new(tx);
        signed.add_signature(signature);
        self.ledger.submit(signed)
    }

    /// Submit `tcx`, then each transaction it queued, in order.
    ///
    /// Each follow-up is built only after its predecessor is confirmed, and
    /// its own follow-ups run before the next sibling. A failing optional
    /// follow-up is skipped; any other failure stops the batch.
    pub fn submit_all(&mut self, tcx: TxContext) -> Result<Vec<SubmittedTx>, CapoError> {
        let mut submitted = Vec::new();
        self.submit_tree("primary", "primary transaction", tcx, &mut submitted)?;
        Ok(submitted)
    }

    fn submit_tree(
        &mut self,
        name: &str,
        description: &str,
        mut tcx: TxContext,
        submitted: &mut Vec<SubmittedTx>,
    ) -> Result<(), CapoError> {
        let receipt = self.submit(&mut tcx)?;
        submitted.push(SubmittedTx {
            name: name.to_string(),
            description: description.to_string(),
            receipt,
        });

        for (addl_name, txn) in tcx.take_addl_txns() {
            let optional = txn.optional;
            let addl_description = txn.description.clone();
            info!("running additional transaction '{}': {}", addl_name, addl_description);
            let result = txn
                .resolve(&self.ledger as &dyn LedgerQuery)
                .and_then(|next| self.submit_tree(&addl_name, &addl_description, next, submitted));
            match result {
                Ok(()) => {}
                Err(err) if optional => {
                    warn!("optional transaction '{}' failed; continuing: {}", addl_name, err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_ledger::MockLedger;
    use crate::signer::DevSigner;
    use capo_core::config::Network;
    use capo_core::objects::{TxOutput, Value};
    use capo_transaction::TxDescription;

    fn session(signer: Option<&str>) -> Session<MockLedger> {
        let params = NetworkParams::emulator();
        let ledger = MockLedger::new(params.clone());
        let signer = signer.map(|name| Box::new(DevSigner::new(name)) as Box<dyn Signer>);
        Session::init(params, ledger, signer).unwrap()
    }

    fn payment(session: &Session<MockLedger>, to: Address, amount: u64) -> TxContext {
        let mut tcx = session.tcx();
        tcx.add_output(TxOutput::new(to, Value::lovelace(amount))).unwrap();
        tcx
    }

    #[test]
    fn test_init_checks_network() {
        let ledger = MockLedger::new(NetworkParams::emulator());
        let err = Session::init(NetworkParams::preview(), ledger, None).err().unwrap();
        assert!(matches!(err, CapoError::Config(_)));
        assert_eq!(session(None).params().network, Network::Emulator);
    }

    #[test]
    fn test_missing_signer_raised_at_first_need() {
        let mut session = session(None);
        let mut tcx = payment(&session, DevSigner::new("bob").address(), 2_000_000);
        let err = session.submit(&mut tcx).unwrap_err();
        assert!(matches!(err, CapoError::MissingActor(_)));
    }

    #[test]
    fn test_balancing_adds_inputs_fee_and_change() {
        let mut session = session(Some("alice"));
        let alice = session.wallet_address().unwrap();
        let bob = DevSigner::new("bob").address();
        session.ledger_mut().fund(alice, 3_000_000);
        session.ledger_mut().fund(alice, 40_000_000);

        let mut tcx = payment(&session, bob, 10_000_000);
        let receipt = session.submit(&mut tcx).unwrap();
        let tx = session.ledger().transaction(&receipt.tx_id).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert!(tx.fee >= session.params().fee_for_size(tx.size()));
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].address, alice);
    }

    #[test]
    fn test_tree_submission_leaves_sibling_claims_alone() {
        let mut session = session(Some("alice"));
        let alice = session.wallet_address().unwrap();
        let bob = DevSigner::new("bob").address();
        let big = session.ledger_mut().fund(alice, 50_000_000);
        session.ledger_mut().fund(alice, 20_000_000);

        let mut tree = TxContextTree::new();
        let root = tree.root(session.tcx());
        let first = tree.child(root, payment(&session, bob, 2_000_000)).unwrap();
        let second = tree.child(root, session.tcx()).unwrap();
        tree.get_mut(second).unwrap().add_input(big.clone(), None).unwrap();

        let receipt = session.submit_in(&mut tree, first).unwrap();
        let tx = session.ledger().transaction(&receipt.tx_id).unwrap();
        assert!(!tx.spends(&big.id));
        assert!(tx.inputs.iter().all(|i| tree.reserved_utxos(second).contains(&i.utxo.id)));
        assert!(session.submit_in(&mut tree, first).is_err());
    }

    #[test]
    fn test_addl_txns_run_in_order_and_skip_optional_failures() {
        let mut session = session(Some("alice"));
        let alice = session.wallet_address().unwrap();
        let bob = DevSigner::new("bob").address();
        for _ in 0..3 {
            session.ledger_mut().fund(alice, 20_000_000);
        }

        let params = session.params().clone();
        let mut tcx = payment(&session, bob, 2_000_000);
        tcx.include_addl_txn(
            "first",
            TxDescription::ready("pay bob again", payment(&session, bob, 3_000_000)),
        )
        .unwrap();
        tcx.include_addl_txn(
            "broken",
            TxDescription::deferred("always fails", |_| {
                Err(CapoError::InvalidState("not today".to_string()))
            })
            .optional(),
        )
        .unwrap();
        tcx.include_addl_txn(
            "last",
            TxDescription::deferred("sees confirmed state", move |ledger| {
                assert_eq!(ledger.spendable_utxos(&bob)?.len(), 2);
                let mut next = TxContext::new(&params);
                next.add_output(TxOutput::new(bob, Value::lovelace(4_000_000)))?;
                Ok(next)
            }),
        )
        .unwrap();

        let submitted = session.submit_all(tcx).unwrap();
        let names: Vec<&str> = submitted.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["primary", "first", "last"]);
        assert_eq!(session.ledger().spendable_utxos(&bob).unwrap().len(), 3);
    }

    #[test]
    fn test_required_addl_failure_stops_batch() {
        let mut session = session(Some("alice"));
        let alice = session.wallet_address().unwrap();
        session.ledger_mut().fund(alice, 20_000_000);
        let mut tcx = payment(&session, alice, 2_000_000);
        tcx.include_addl_txn(
            "required",
            TxDescription::deferred("fails", |_| Err(CapoError::NotFound("charter".to_string()))),
        )
        .unwrap();
        assert!(matches!(
            session.submit_all(tcx).unwrap_err(),
            CapoError::NotFound(_)
        ));
    }
}
