use log::debug;
use std::collections::BTreeSet;

use capo_core::error::CapoError;
use capo_core::ledger::LedgerQuery;
use capo_core::objects::{Address, TxOutput, TxOutputId, Utxo, Value};
use capo_core::transaction::Transaction;
use capo_transaction::TxContext;

/// Smallest wallet output picked as collateral
pub const MIN_COLLATERAL: u64 = 5_000_000;

/// Tokens the inputs and mints provide beyond what the outputs hold.
///
/// Fails if the outputs hold tokens nothing provides.
fn token_surplus(draft: &Transaction) -> Result<Value, CapoError> {
    let mut surplus = draft.input_value();
    surplus.merge(&draft.minted());
    for output in &draft.outputs {
        for (policy, tokens) in &output.value.assets {
            for (name, quantity) in tokens {
                surplus.add_token(*policy, name.clone(), -quantity);
            }
        }
    }
    if !surplus.is_non_negative() {
        return Err(CapoError::assembly(
            "outputs hold tokens that neither inputs nor mints provide",
            format!("{:?}", surplus.assets),
        ));
    }
    Ok(surplus.with_lovelace(0))
}

/// Balance `tcx` from the wallet at `wallet` and return the finished transaction.
///
/// Wallet inputs are picked only among lovelace-only outputs outside
/// `exclude` and outside what `tcx` already claims. Collateral is added when
/// scripts run. The fee is exact for the final size; everything left over
/// (lovelace and surplus tokens) goes to one change output.
pub fn finalize(
    tcx: &mut TxContext,
    ledger: &dyn LedgerQuery,
    wallet: &Address,
    exclude: &BTreeSet<TxOutputId>,
) -> Result<Transaction, CapoError> {
    let params = tcx.params().clone();
    let mut candidates: Vec<Utxo> = ledger
        .spendable_utxos(wallet)?
        .into_iter()
        .filter(|u| !u.value().has_tokens())
        .filter(|u| !exclude.contains(&u.id) && !tcx.reserved_utxos().contains(&u.id))
        .collect();
    candidates.sort_by(|a, b| b.value().lovelace.cmp(&a.value().lovelace));

    if tcx.builder().runs_scripts() && tcx.builder().collateral().is_none() {
        // smallest sufficient output, leaving the big ones for funding
        let pick = candidates
            .iter()
            .rposition(|u| u.value().lovelace >= MIN_COLLATERAL)
            .ok_or_else(|| {
                CapoError::assembly(
                    format!("no wallet output of at least {} lovelace for collateral", MIN_COLLATERAL),
                    wallet.to_string(),
                )
            })?;
        let collateral = candidates.remove(pick);
        debug!("using {} as collateral", collateral.id);
        tcx.add_collateral(collateral)?;
    }

    let mut candidates = candidates.into_iter();
    loop {
        let draft = tcx.build()?;
        let surplus = token_surplus(&draft)?;
        let change = TxOutput::new(*wallet, surplus);
        let change_size = bincode::serialized_size(&change)? as usize;
        let fee = params.fee_for_size(draft.size() + change_size);

        let available = draft.input_value().lovelace;
        let spent = draft.output_value().lovelace;
        let needed = spent + fee + change.min_deposit(params.coins_per_utxo_byte);
        if available >= needed {
            tcx.set_fee(fee);
            let change = TxOutput {
                value: change.value.with_lovelace(available - spent - fee),
                ..change
            };
            tcx.add_output(change)?;
            return tcx.build();
        }

        match candidates.next() {
            Some(utxo) => {
                debug!("adding wallet input {} ({} lovelace)", utxo.id, utxo.value().lovelace);
                tcx.add_input(utxo, None)?;
            }
            None => {
                return Err(CapoError::assembly(
                    format!(
                        "wallet can't cover the transaction: {} lovelace available, {} needed",
                        available, needed
                    ),
                    wallet.to_string(),
                ))
            }
        }
    }
}
