use crate::model::{
    GoInterface, GoMethod, GoParam, GoStruct, Implementation, MethodMapping, Position,
};
use serde::{Deserialize, Serialize};

/// How closely a struct method must follow the interface declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Same name, same parameter count, same return count.
    #[default]
    Arity,
    /// Arity plus position-wise equality of the type text.
    Strict,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureMatcher {
    mode: MatchMode,
}

impl SignatureMatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn methods_match(&self, interface_method: &GoMethod, struct_method: &GoMethod) -> bool {
        if interface_method.name != struct_method.name
            || interface_method.params.len() != struct_method.params.len()
            || interface_method.returns.len() != struct_method.returns.len()
        {
            return false;
        }
        match self.mode {
            MatchMode::Arity => true,
            MatchMode::Strict => {
                let same_types = |left: &[GoParam], right: &[GoParam]| {
                    left.iter()
                        .zip(right)
                        .all(|(l, r)| l.param_type == r.param_type)
                };
                same_types(&interface_method.params, &struct_method.params)
                    && same_types(&interface_method.returns, &struct_method.returns)
            }
        }
    }

    /// First matching struct method for each interface method, in interface order.
    pub fn method_mappings(&self, interface: &GoInterface, go_struct: &GoStruct) -> Vec<MethodMapping> {
        interface
            .methods
            .iter()
            .filter_map(|interface_method| {
                go_struct
                    .methods
                    .iter()
                    .find(|struct_method| self.methods_match(interface_method, struct_method))
                    .map(|struct_method| MethodMapping {
                        interface_method: interface_method.clone(),
                        struct_method: struct_method.clone(),
                    })
            })
            .collect()
    }

    pub fn find_implementations(
        &self,
        interfaces: &[GoInterface],
        structs: &[GoStruct],
    ) -> Vec<Implementation> {
        let mut out = Vec::new();
        for interface in interfaces {
            for go_struct in structs {
                let mappings = self.method_mappings(interface, go_struct);
                if mappings.is_empty() || mappings.len() != interface.methods.len() {
                    continue;
                }
                out.push(Implementation {
                    interface_name: interface.name.clone(),
                    struct_name: go_struct.name.clone(),
                    interface_file: interface.file_path.clone(),
                    struct_file: go_struct.file_path.clone(),
                    method_mappings: mappings,
                });
            }
        }
        tracing::debug!(
            interfaces = interfaces.len(),
            structs = structs.len(),
            implementations = out.len(),
            "implementations matched"
        );
        out
    }

    /// Every interface method has a counterpart. An empty interface counts as
    /// implemented here even though [`Self::find_implementations`] skips it.
    pub fn is_complete_implementation(&self, interface: &GoInterface, go_struct: &GoStruct) -> bool {
        self.method_mappings(interface, go_struct).len() == interface.methods.len()
    }

    pub fn missing_methods<'a>(
        &self,
        interface: &'a GoInterface,
        go_struct: &GoStruct,
    ) -> Vec<&'a GoMethod> {
        let mappings = self.method_mappings(interface, go_struct);
        interface
            .methods
            .iter()
            .filter(|method| {
                !mappings
                    .iter()
                    .any(|mapping| mapping.interface_method.name == method.name)
            })
            .collect()
    }
}

pub fn find_interface_method_at<'a>(
    position: Position,
    interfaces: &'a [GoInterface],
) -> Option<(&'a GoInterface, &'a GoMethod)> {
    interfaces.iter().find_map(|interface| {
        interface
            .methods
            .iter()
            .find(|method| method.range.contains(position))
            .map(|method| (interface, method))
    })
}

pub fn find_struct_method_at<'a>(
    position: Position,
    structs: &'a [GoStruct],
) -> Option<(&'a GoStruct, &'a GoMethod)> {
    structs.iter().find_map(|go_struct| {
        go_struct
            .methods
            .iter()
            .find(|method| method.range.contains(position))
            .map(|method| (go_struct, method))
    })
}

/// Struct-side counterparts of `interface_name.method_name` across all implementations.
pub fn implementations_for_interface_method<'a>(
    interface_name: &str,
    method_name: &str,
    implementations: &'a [Implementation],
) -> Vec<&'a MethodMapping> {
    implementations
        .iter()
        .filter(|implementation| implementation.interface_name == interface_name)
        .flat_map(|implementation| &implementation.method_mappings)
        .filter(|mapping| mapping.interface_method.name == method_name)
        .collect()
}

pub fn interfaces_for_struct_method<'a>(
    struct_name: &str,
    method_name: &str,
    implementations: &'a [Implementation],
) -> Vec<&'a MethodMapping> {
    implementations
        .iter()
        .filter(|implementation| implementation.struct_name == struct_name)
        .flat_map(|implementation| &implementation.method_mappings)
        .filter(|mapping| mapping.struct_method.name == method_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::golang::GoAnalyzer;
    use std::path::Path;

    const SOURCE: &str = r#"package biz

type UserRepo interface {
	Save(ctx context.Context, u *User) (*User, error)
	FindByID(ctx context.Context, id int64) (*User, error)
}

type userRepo struct {
	data *Data
}

func (r *userRepo) Save(ctx context.Context, u *User) (*User, error) { return u, nil }
func (r *userRepo) FindByID(ctx context.Context, id int) (*User, error) { return nil, nil }

type halfRepo struct{}

func (h halfRepo) Save(ctx context.Context, u *User) (*User, error) { return u, nil }
"#;

    fn analyzed() -> crate::model::FileAnalysis {
        GoAnalyzer::new().analyze(Path::new("biz/user.go"), SOURCE)
    }

    #[test]
    fn arity_mode_finds_complete_implementations_only() {
        let analysis = analyzed();
        let impls =
            SignatureMatcher::default().find_implementations(&analysis.interfaces, &analysis.structs);
        assert_eq!(impls.len(), 1);
        assert_eq!(impls[0].interface_name, "UserRepo");
        assert_eq!(impls[0].struct_name, "userRepo");
        assert_eq!(impls[0].method_mappings.len(), 2);
    }

    #[test]
    fn strict_mode_compares_type_text() {
        let analysis = analyzed();
        let strict = SignatureMatcher::new(MatchMode::Strict);
        assert!(strict.find_implementations(&analysis.interfaces, &analysis.structs).is_empty());
        let missing = strict.missing_methods(&analysis.interfaces[0], &analysis.structs[0]);
        let names: Vec<_> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["FindByID"]);
    }

    #[test]
    fn missing_methods_by_name() {
        let analysis = analyzed();
        let matcher = SignatureMatcher::default();
        let half = analysis.structs.iter().find(|s| s.name == "halfRepo").unwrap();
        let missing = matcher.missing_methods(&analysis.interfaces[0], half);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "FindByID");
        assert!(!matcher.is_complete_implementation(&analysis.interfaces[0], half));
    }

    #[test]
    fn cursor_queries_use_inclusive_ranges() {
        let analysis = analyzed();
        let save = &analysis.interfaces[0].methods[0];
        let (interface, method) =
            find_interface_method_at(save.range.end, &analysis.interfaces).unwrap();
        assert_eq!(interface.name, "UserRepo");
        assert_eq!(method.name, "Save");

        let struct_save = &analysis.structs[0].methods[0];
        let (go_struct, method) =
            find_struct_method_at(struct_save.position, &analysis.structs).unwrap();
        assert_eq!(go_struct.name, "userRepo");
        assert_eq!(method.name, "Save");
        assert!(find_struct_method_at(Position::new(0, 0), &analysis.structs).is_none());
    }

    #[test]
    fn lookups_through_implementations() {
        let analysis = analyzed();
        let impls =
            SignatureMatcher::default().find_implementations(&analysis.interfaces, &analysis.structs);
        let forward = implementations_for_interface_method("UserRepo", "Save", &impls);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].struct_method.name, "Save");
        let backward = interfaces_for_struct_method("userRepo", "FindByID", &impls);
        assert_eq!(backward.len(), 1);
        assert!(interfaces_for_struct_method("halfRepo", "Save", &impls).is_empty());
    }
}
