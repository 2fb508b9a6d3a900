use rustc_hash::FxHashSet;

/// Names that are definitely assigned at the current point of a scope.
///
/// Branch bodies are parsed against a clone; whatever a branch defines is
/// folded back with [`Scope::absorb`], so a name assigned on any path counts
/// as defined after the construct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    names: FxHashSet<String>,
}

impl Scope {
    pub fn with_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            names: names.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn define(&mut self, name: &str) {
        if !self.names.contains(name) {
            self.names.insert(name.to_string());
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn absorb(&mut self, branch: Scope) {
        self.names.extend(branch.names);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorbs_names_from_every_branch() {
        let mut outer = Scope::with_names(["a"]);
        let mut then_branch = outer.clone();
        then_branch.define("b");
        let mut else_branch = outer.clone();
        else_branch.define("c");

        outer.absorb(then_branch);
        outer.absorb(else_branch);

        assert!(outer.is_defined("a"));
        assert!(outer.is_defined("b"));
        assert!(outer.is_defined("c"));
        assert!(!outer.is_defined("d"));
    }
}
