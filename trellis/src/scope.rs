use std::fmt;

/// Identity of a node in the injector context tree.
///
/// Scopes are used for diagnostics, for scope restricted tokens and as the
/// value of the built-in [`crate::INJECTION_SCOPE`] token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InjectionScope {
    /// The root of every context tree.
    Root,
    /// A named scope, such as a request scope.
    Named(&'static str),
    /// Instantiation of a class provider.
    Class { type_name: &'static str },
    /// Invocation of a factory provider.
    Factory { token: String },
    /// Invocation of a method, or resolution of one of its parameters.
    Method {
        target: &'static str,
        method: &'static str,
        param: Option<&'static str>,
    },
}

impl InjectionScope {
    /// Returns `true` when the scope is the scope of a method parameter.
    pub fn is_param(&self) -> bool {
        matches!(
            self,
            InjectionScope::Method {
                param: Some(_),
                ..
            }
        )
    }
}

impl fmt::Display for InjectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionScope::Root => write!(f, "Root"),
            InjectionScope::Named(name) => write!(f, "{name}"),
            InjectionScope::Class { type_name } => write!(f, "{}", short_type_name(type_name)),
            InjectionScope::Factory { token } => write!(f, "Factory({token})"),
            InjectionScope::Method {
                target,
                method,
                param: None,
            } => write!(f, "{}.{method}", short_type_name(target)),
            InjectionScope::Method {
                target,
                method,
                param: Some(param),
            } => write!(f, "{}.{method}({param})", short_type_name(target)),
        }
    }
}

/// Strips module paths from a type name, keeping generic arguments readable.
pub(crate) fn short_type_name(name: &str) -> &str {
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(index) => &name[index + 2..],
        None => name,
    }
}
