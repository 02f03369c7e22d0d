//! Quantity storage.
//!
//! Quantities are only ever inserted or replaced wholesale per element. [`QuantityStore::replace_for_element`]
//! swaps an element's quantities in one step; readers see either the old set
//! or the new one, never a partial or empty set in between.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::errors::{CalcError, CalcResult};
use crate::quantity::Quantity;

pub trait QuantityStore: Send + Sync {
    fn insert(&self, quantity: Quantity) -> CalcResult<()>;

    /// Drop every quantity of `element_id` and store `quantities` in its place, atomically.
    fn replace_for_element(&self, element_id: &Uuid, quantities: Vec<Quantity>) -> CalcResult<()>;

    /// Remove one quantity, returning it if it was stored
    fn remove(&self, element_id: &Uuid, quantity_id: &Uuid) -> CalcResult<Option<Quantity>>;

    /// Remove an element's quantities, returning how many were removed
    fn delete_for_element(&self, element_id: &Uuid) -> CalcResult<usize>;

    fn for_element(&self, element_id: &Uuid) -> CalcResult<Vec<Quantity>>;

    fn all(&self) -> CalcResult<Vec<Quantity>>;
}

/// Quantities grouped by element behind a single `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryQuantityStore {
    by_element: RwLock<BTreeMap<Uuid, Vec<Quantity>>>,
}

impl InMemoryQuantityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a loaded project
    pub fn from_quantities(quantities: impl IntoIterator<Item = Quantity>) -> Self {
        let mut by_element: BTreeMap<Uuid, Vec<Quantity>> = BTreeMap::new();
        for q in quantities {
            by_element.entry(q.element_id).or_default().push(q);
        }
        Self {
            by_element: RwLock::new(by_element),
        }
    }

    fn read(&self) -> CalcResult<RwLockReadGuard<'_, BTreeMap<Uuid, Vec<Quantity>>>> {
        self.by_element
            .read()
            .map_err(|_| CalcError::internal("quantity store lock poisoned"))
    }

    fn write(&self) -> CalcResult<RwLockWriteGuard<'_, BTreeMap<Uuid, Vec<Quantity>>>> {
        self.by_element
            .write()
            .map_err(|_| CalcError::internal("quantity store lock poisoned"))
    }
}

impl QuantityStore for InMemoryQuantityStore {
    fn insert(&self, quantity: Quantity) -> CalcResult<()> {
        self.write()?.entry(quantity.element_id).or_default().push(quantity);
        Ok(())
    }

    fn replace_for_element(&self, element_id: &Uuid, quantities: Vec<Quantity>) -> CalcResult<()> {
        if let Some(stray) = quantities.iter().find(|q| &q.element_id != element_id) {
            return Err(CalcError::internal(format!(
                "quantity {} belongs to element {}, not {}",
                stray.id, stray.element_id, element_id
            )));
        }
        let mut map = self.write()?;
        if quantities.is_empty() {
            map.remove(element_id);
        } else {
            map.insert(*element_id, quantities);
        }
        Ok(())
    }

    fn remove(&self, element_id: &Uuid, quantity_id: &Uuid) -> CalcResult<Option<Quantity>> {
        let mut map = self.write()?;
        let Some(quantities) = map.get_mut(element_id) else {
            return Ok(None);
        };
        let removed = quantities
            .iter()
            .position(|q| &q.id == quantity_id)
            .map(|index| quantities.remove(index));
        if quantities.is_empty() {
            map.remove(element_id);
        }
        Ok(removed)
    }

    fn delete_for_element(&self, element_id: &Uuid) -> CalcResult<usize> {
        Ok(self.write()?.remove(element_id).map_or(0, |q| q.len()))
    }

    fn for_element(&self, element_id: &Uuid) -> CalcResult<Vec<Quantity>> {
        Ok(self.read()?.get(element_id).cloned().unwrap_or_default())
    }

    fn all(&self) -> CalcResult<Vec<Quantity>> {
        Ok(self.read()?.values().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Parameters;
    use crate::quantity::CalculationResult;
    use crate::units::Unit;
    use chrono::Utc;

    fn quantity(element_id: Uuid, value: f64) -> Quantity {
        Quantity::new(
            element_id,
            Uuid::new_v4(),
            CalculationResult {
                raw_result: value,
                standardized_result: value,
                unit: Unit::CubicMetre,
                calculation_steps: Vec::new(),
                formula_used: "v".into(),
                parameters_used: Parameters::new(),
                warnings: Vec::new(),
                engine_version: "test".into(),
                calculated_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_insert_and_query() {
        let store = InMemoryQuantityStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.insert(quantity(a, 1.0)).unwrap();
        store.insert(quantity(a, 2.0)).unwrap();
        store.insert(quantity(b, 3.0)).unwrap();
        assert_eq!(store.for_element(&a).unwrap().len(), 2);
        assert_eq!(store.all().unwrap().len(), 3);
        assert!(store.for_element(&Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_replace_for_element() {
        let store = InMemoryQuantityStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.insert(quantity(a, 1.0)).unwrap();
        store.insert(quantity(b, 9.0)).unwrap();

        store.replace_for_element(&a, vec![quantity(a, 5.0), quantity(a, 6.0)]).unwrap();
        let values: Vec<_> = store.for_element(&a).unwrap().iter().map(|q| q.value).collect();
        assert_eq!(values, vec![5.0, 6.0]);
        assert_eq!(store.for_element(&b).unwrap().len(), 1);

        store.replace_for_element(&a, Vec::new()).unwrap();
        assert!(store.for_element(&a).unwrap().is_empty());
    }

    #[test]
    fn test_replace_rejects_foreign_quantities() {
        let store = InMemoryQuantityStore::new();
        let a = Uuid::new_v4();
        store.insert(quantity(a, 1.0)).unwrap();
        let err = store
            .replace_for_element(&a, vec![quantity(Uuid::new_v4(), 2.0)])
            .unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(store.for_element(&a).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_single_quantity() {
        let store = InMemoryQuantityStore::new();
        let a = Uuid::new_v4();
        let keep = quantity(a, 1.0);
        let extra = quantity(a, 2.0);
        store.insert(keep.clone()).unwrap();
        store.insert(extra.clone()).unwrap();

        assert_eq!(store.remove(&a, &extra.id).unwrap(), Some(extra.clone()));
        assert_eq!(store.remove(&a, &extra.id).unwrap(), None);
        assert_eq!(store.for_element(&a).unwrap(), vec![keep.clone()]);

        store.remove(&a, &keep.id).unwrap();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_seed() {
        let a = Uuid::new_v4();
        let store = InMemoryQuantityStore::from_quantities(vec![quantity(a, 1.0), quantity(a, 2.0)]);
        assert_eq!(store.delete_for_element(&a).unwrap(), 2);
        assert_eq!(store.delete_for_element(&a).unwrap(), 0);
    }
}
