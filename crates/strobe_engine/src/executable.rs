//! The compiled unit: symbol table, storage and the ordered store list.
//!
//! An [`Executable`] is produced by an external compiler and handed to the
//! engine as an in-memory structure. One call to [`Executable::update`] is
//! one tick: every store runs once, in compile order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::expr::Slot;
use crate::storage::DataStore;
use crate::store::StoreOp;
use crate::symbol::{SymbolId, SymbolKind, SymbolTable};
use crate::value::WidthClass;

/// A compiled design ready for cycle-accurate evaluation.
///
/// The store list is total and fixed at compile time, ordered so that every
/// read of a combinational node observes a value produced earlier in the
/// same tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Executable {
    info: SymbolTable,
    data: DataStore,
    stores: Vec<StoreOp>,
}

impl Executable {
    /// Builds an executable from its symbol table and ordered store list.
    ///
    /// Storage is allocated zero-initialized from the table.
    pub fn new(info: SymbolTable, stores: Vec<StoreOp>) -> Self {
        let data = DataStore::for_table(&info);
        Self { info, data, stores }
    }

    /// The symbol table.
    pub fn info(&self) -> &SymbolTable {
        &self.info
    }

    /// The current storage state.
    pub fn data(&self) -> &DataStore {
        &self.data
    }

    /// Mutable access to storage, used by the simulation façade for pokes.
    pub fn data_mut(&mut self) -> &mut DataStore {
        &mut self.data
    }

    /// Replaces the storage state, e.g. to restore a snapshot.
    ///
    /// Loads address storage by index, so the new state is picked up by the
    /// very next evaluation.
    pub fn restore(&mut self, data: DataStore) {
        self.data = data;
    }

    /// Runs one full evaluation pass over the store list.
    pub fn update(&mut self) {
        for store in &self.stores {
            store.execute(&mut self.data);
        }
    }

    /// Derives the combinational sink-to-sources map over IO leaves.
    ///
    /// A path counts as combinational when it runs from an input to an
    /// output purely through node stores; registers and memory cells break
    /// it, while memory addresses propagate it. The result maps each output
    /// name to the sorted input names it combinationally depends on.
    pub fn combinational_io_paths(&self) -> HashMap<String, Vec<String>> {
        // Scalar destination cell -> symbol, for resolving store targets.
        let mut by_slot: HashMap<Slot, SymbolId> = HashMap::new();
        for (id, sym) in self.info.iter() {
            if sym.is_memory() {
                continue;
            }
            let slot = match sym.class {
                WidthClass::Bool => Slot::Bool(sym.index),
                WidthClass::Long => Slot::Long(sym.index),
                WidthClass::Big => Slot::Big(sym.index),
            };
            by_slot.insert(slot, id);
        }

        // Direct read sets per driven symbol.
        let mut direct: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
        for store in &self.stores {
            let (dest, expr_loads) = match store {
                StoreOp::Bool { index, expr } => {
                    let mut loads = Vec::new();
                    expr.for_each_load(&mut |s| loads.push(s));
                    (by_slot.get(&Slot::Bool(*index)), loads)
                }
                StoreOp::Long { index, expr } => {
                    let mut loads = Vec::new();
                    expr.for_each_load(&mut |s| loads.push(s));
                    (by_slot.get(&Slot::Long(*index)), loads)
                }
                StoreOp::Big { index, expr } => {
                    let mut loads = Vec::new();
                    expr.for_each_load(&mut |s| loads.push(s));
                    (by_slot.get(&Slot::Big(*index)), loads)
                }
                // Memory writes update state; they never extend a
                // combinational path.
                StoreOp::LongMem { .. } | StoreOp::BigMem { .. } => (None, Vec::new()),
            };
            let Some(&dest) = dest else { continue };
            let entry = direct.entry(dest).or_default();
            for slot in expr_loads {
                if let Some(&src) = by_slot.get(&slot) {
                    entry.push(src);
                }
            }
        }

        // Transitively resolve every output to the inputs that reach it
        // through nodes. Store order is topological, so this terminates.
        fn resolve(
            id: SymbolId,
            info: &SymbolTable,
            direct: &HashMap<SymbolId, Vec<SymbolId>>,
            memo: &mut HashMap<SymbolId, Vec<SymbolId>>,
        ) -> Vec<SymbolId> {
            if let Some(cached) = memo.get(&id) {
                return cached.clone();
            }
            let result = match info.get(id).kind {
                SymbolKind::Input => vec![id],
                SymbolKind::Register => Vec::new(),
                SymbolKind::Output | SymbolKind::Node => {
                    let mut sources = Vec::new();
                    for &dep in direct.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                        sources.extend(resolve(dep, info, direct, memo));
                    }
                    sources.sort_unstable_by_key(|s| s.as_raw());
                    sources.dedup();
                    sources
                }
            };
            memo.insert(id, result.clone());
            result
        }

        let mut memo = HashMap::new();
        let mut paths = HashMap::new();
        for (id, sym) in self.info.iter() {
            if sym.kind != SymbolKind::Output {
                continue;
            }
            let sources = resolve(id, &self.info, &direct, &mut memo);
            if sources.is_empty() {
                continue;
            }
            let mut names: Vec<String> = sources
                .into_iter()
                .map(|s| self.info.get(s).name.clone())
                .collect();
            names.sort();
            paths.insert(sym.name.clone(), names);
        }
        paths
    }
}
