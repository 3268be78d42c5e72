// Prefix-scoped view over a `TreeWrapper`: `leaf("pt")` under prefix "jet_" addresses "jet_pt".
use crate::core::leaf::LeafMut;
use crate::core::wrapper::TreeWrapper;

pub struct TreeGroup<'w, 's> {
    prefix: String,
    wrapper: &'w mut TreeWrapper<'s>,
}

impl<'s> TreeWrapper<'s> {
    pub fn prefixed(&mut self, prefix: &str) -> TreeGroup<'_, 's> {
        TreeGroup {
            prefix: prefix.to_string(),
            wrapper: self,
        }
    }
}

impl<'w, 's> TreeGroup<'w, 's> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn leaf(&mut self, name: &str) -> LeafMut<'_, 's> {
        let full = format!("{}{name}", self.prefix);
        self.wrapper.leaf(&full)
    }

    /// Nested view; the inner prefix is appended to this one.
    pub fn group(&mut self, prefix: &str) -> TreeGroup<'_, 's> {
        TreeGroup {
            prefix: format!("{}{prefix}", self.prefix),
            wrapper: &mut *self.wrapper,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::memory::MemoryStore;
    use crate::core::wrapper::TreeWrapper;

    #[test]
    fn prefixes_compose_outer_then_inner() {
        let mut wrapper = TreeWrapper::new();
        let mut jets = wrapper.prefixed("jet_");
        *jets.leaf("pt").write::<f32>().expect("pt") = 1.5;
        let mut sub = jets.group("sub_");
        assert_eq!(sub.prefix(), "jet_sub_");
        *sub.leaf("eta").write::<f32>().expect("eta") = 0.5;

        assert_eq!(
            wrapper.get_leaf("jet_pt").and_then(|leaf| leaf.get::<f32>().ok()),
            Some(&1.5)
        );
        assert!(wrapper.get_leaf("jet_sub_eta").is_some());
        assert_eq!(wrapper.leaf_count(), 2);
    }

    #[test]
    fn group_leaf_reads_through_shared_registry() {
        let mut store = MemoryStore::new()
            .with_column("mu_pt", vec![3.0f64, 4.0])
            .expect("mu_pt");
        let mut wrapper = TreeWrapper::with_store(&mut store);
        wrapper.prefixed("mu_").leaf("pt").read::<f64>().expect("read");
        assert!(wrapper.advance().expect("advance"));
        assert!(wrapper.advance().expect("advance"));
        assert_eq!(wrapper.leaf("mu_pt").read::<f64>().expect("read"), &4.0);
    }
}
