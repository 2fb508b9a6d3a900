use rustc_hash::{FxHashMap, FxHashSet};

use super::Type;
use super::error::{TypeError, TypeResult};

/// Storage type of every name in one scope, in first-assignment order.
///
/// `int` and `bigint` are two representations of the same source type: a
/// name that ever receives a bigint is widened, and the widening is
/// remembered so a later inference round can start from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeEnv {
    types: FxHashMap<String, Type>,
    order: Vec<String>,
    widened: FxHashSet<String>,
}

impl TypeEnv {
    pub(super) fn with_widened(widened: FxHashSet<String>) -> Self {
        Self {
            widened,
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.order
            .iter()
            .filter_map(|name| self.types.get(name).map(|ty| (name.as_str(), ty)))
    }

    pub(super) fn widened(&self) -> &FxHashSet<String> {
        &self.widened
    }

    pub fn assign(&mut self, name: &str, ty: Type, line: usize) -> TypeResult<()> {
        let ty = if ty == Type::Int && self.widened.contains(name) {
            Type::BigInt
        } else {
            ty
        };
        match self.types.get(name) {
            None => {
                self.order.push(name.to_string());
                self.types.insert(name.to_string(), ty);
                Ok(())
            }
            Some(existing) if *existing == ty => Ok(()),
            Some(Type::BigInt) if ty == Type::Int => Ok(()),
            Some(Type::Int) if ty == Type::BigInt => {
                self.widen(name);
                Ok(())
            }
            Some(existing) => Err(TypeError::new(
                format!("variable '{name}' reassigned from {existing} to {ty}"),
                line,
            )),
        }
    }

    /// Folds a branch environment back in. Names known on only one side are
    /// carried over; names typed differently on two sides are rejected.
    pub fn merge(&mut self, branch: TypeEnv, line: usize) -> TypeResult<()> {
        self.widened.extend(branch.widened.iter().cloned());
        for name in &branch.order {
            let Some(theirs) = branch.types.get(name) else {
                continue;
            };
            match self.types.get(name) {
                None => {
                    self.order.push(name.clone());
                    self.types.insert(name.clone(), theirs.clone());
                }
                Some(ours) if ours == theirs => {}
                Some(ours) if ours.is_integer() && theirs.is_integer() => self.widen(name),
                Some(ours) => {
                    return Err(TypeError::new(
                        format!(
                            "variable '{name}' has conflicting types {ours} and {theirs} across branches"
                        ),
                        line,
                    ));
                }
            }
        }
        for name in branch.widened {
            if self.types.get(&name) == Some(&Type::Int) {
                self.widen(&name);
            }
        }
        Ok(())
    }

    fn widen(&mut self, name: &str) {
        self.types.insert(name.to_string(), Type::BigInt);
        self.widened.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reassignment_with_new_type() {
        let mut env = TypeEnv::default();
        env.assign("a", Type::Str, 1).expect("first assignment");
        let err = env.assign("a", Type::Int, 2).expect_err("type change");
        assert_eq!(err.message, "variable 'a' reassigned from str to int");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn widens_int_to_bigint() {
        let mut env = TypeEnv::default();
        env.assign("n", Type::Int, 1).expect("int");
        env.assign("n", Type::BigInt, 2).expect("bigint");
        env.assign("n", Type::Int, 3).expect("int again");
        assert_eq!(env.get("n"), Some(&Type::BigInt));
        assert!(env.widened().contains("n"));
    }

    #[test]
    fn merges_one_sided_names_and_rejects_conflicts() {
        let mut env = TypeEnv::default();
        env.assign("x", Type::Int, 1).expect("x");

        let mut then_env = env.clone();
        then_env.assign("s", Type::Str, 2).expect("s");
        env.merge(then_env, 2).expect("merge then");
        assert_eq!(env.get("s"), Some(&Type::Str));

        let mut other = TypeEnv::default();
        other.assign("s", Type::List, 4).expect("s list");
        let err = env.merge(other, 4).expect_err("conflict");
        assert!(err.message.contains("conflicting types str and list[int]"));
    }

    #[test]
    fn keeps_first_assignment_order() {
        let mut env = TypeEnv::default();
        for name in ["c", "a", "b"] {
            env.assign(name, Type::Int, 1).expect("assign");
        }
        let names: Vec<_> = env.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
