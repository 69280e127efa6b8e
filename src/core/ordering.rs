//! Interceptor chain assembly.
//!
//! The chain attached to a client is derived from three inputs: the
//! process-wide interceptors, the client's override / substitute lists and an
//! optional security interceptor built from its configuration. Whatever the
//! inputs, at most one security interceptor survives and it always runs first.
use std::sync::Arc;

use crate::{config::client::ClientConfiguration, ports::interceptor::Interceptor};

/// Pure ordering rules for interceptor chains.
pub struct InterceptorOrderingPolicy;

impl InterceptorOrderingPolicy {
    /// Build the final chain for a client.
    ///
    /// * With overrides, the override list is used verbatim.
    /// * Otherwise the `available` interceptors are used minus any security
    ///   interceptor, with configured substitutes swapped in place.
    ///
    /// `security` (if any) then goes to the front via [`Self::order`].
    pub fn build_chain(
        config: &ClientConfiguration,
        available: Vec<Arc<dyn Interceptor>>,
        security: Option<Arc<dyn Interceptor>>,
    ) -> Vec<Arc<dyn Interceptor>> {
        let candidates = if config.has_interceptor_overrides() {
            config.interceptor_overrides().to_vec()
        } else {
            available
                .into_iter()
                .filter(|interceptor| !interceptor.is_security())
                .map(|interceptor| {
                    config
                        .interceptor_substitute(interceptor.interceptor_type())
                        .unwrap_or(interceptor)
                })
                .collect()
        };

        Self::order(candidates, security)
    }

    /// Put security first and keep every other relative position.
    ///
    /// A supplied `security` interceptor replaces any security interceptor in
    /// `candidates`. Without one, the first security interceptor found in
    /// `candidates` is promoted and later ones are dropped.
    pub fn order(
        candidates: Vec<Arc<dyn Interceptor>>,
        security: Option<Arc<dyn Interceptor>>,
    ) -> Vec<Arc<dyn Interceptor>> {
        let mut leading = security;
        let mut ordered = Vec::with_capacity(candidates.len() + 1);

        for interceptor in candidates {
            if interceptor.is_security() {
                if leading.is_none() {
                    leading = Some(interceptor);
                } else {
                    tracing::debug!(
                        "Dropping duplicate security interceptor '{}'",
                        interceptor.name()
                    );
                }
            } else {
                ordered.push(interceptor);
            }
        }

        if let Some(security) = leading {
            ordered.insert(0, security);
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(&'static str);
    struct Audit(&'static str);
    struct Security(&'static str);

    impl Interceptor for Plain {
        fn name(&self) -> &str {
            self.0
        }
    }

    impl Interceptor for Audit {
        fn name(&self) -> &str {
            self.0
        }
    }

    impl Interceptor for Security {
        fn name(&self) -> &str {
            self.0
        }

        fn is_security(&self) -> bool {
            true
        }
    }

    fn names(chain: &[Arc<dyn Interceptor>]) -> Vec<&str> {
        chain.iter().map(|i| i.name()).collect()
    }

    #[test]
    fn test_supplied_security_replaces_existing_and_leads() {
        let candidates: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Plain("A")),
            Arc::new(Security("SecurityX")),
            Arc::new(Plain("B")),
        ];
        let ordered =
            InterceptorOrderingPolicy::order(candidates, Some(Arc::new(Security("SecurityY"))));
        assert_eq!(names(&ordered), vec!["SecurityY", "A", "B"]);
    }

    #[test]
    fn test_order_without_security_is_identity() {
        let candidates: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Plain("C")), Arc::new(Plain("D"))];
        let ordered = InterceptorOrderingPolicy::order(candidates, None);
        assert_eq!(names(&ordered), vec!["C", "D"]);
    }

    #[test]
    fn test_existing_security_is_promoted() {
        let candidates: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Plain("C")),
            Arc::new(Plain("D")),
            Arc::new(Security("S1")),
            Arc::new(Security("S2")),
        ];
        let ordered = InterceptorOrderingPolicy::order(candidates, None);
        assert_eq!(names(&ordered), vec!["S1", "C", "D"]);
    }

    #[test]
    fn test_overrides_are_used_verbatim() {
        let config = ClientConfiguration::new()
            .with_interceptor_overrides(vec![Arc::new(Plain("C")), Arc::new(Plain("D"))]);
        let available: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Plain("A")), Arc::new(Audit("logging"))];
        let chain = InterceptorOrderingPolicy::build_chain(&config, available, None);
        assert_eq!(names(&chain), vec!["C", "D"]);
    }

    #[test]
    fn test_overrides_with_security_at_non_zero_position() {
        let config = ClientConfiguration::new().with_interceptor_overrides(vec![
            Arc::new(Plain("C")),
            Arc::new(Security("S")),
            Arc::new(Plain("D")),
        ]);
        let chain = InterceptorOrderingPolicy::build_chain(&config, Vec::new(), None);
        assert_eq!(names(&chain), vec!["S", "C", "D"]);
    }

    #[test]
    fn test_default_chain_filters_security_and_substitutes_in_place() {
        let config = ClientConfiguration::new()
            .add_interceptor_substitute(Arc::new(Audit("audit-replacement")));
        let available: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Plain("A")),
            Arc::new(Security("registry-security")),
            Arc::new(Audit("audit")),
            Arc::new(Plain("B")),
        ];
        let chain = InterceptorOrderingPolicy::build_chain(
            &config,
            available,
            Some(Arc::new(Security("configured-security"))),
        );
        assert_eq!(
            names(&chain),
            vec!["configured-security", "A", "audit-replacement", "B"]
        );
    }

    #[test]
    fn test_default_chain_without_configured_security_has_none() {
        let available: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Security("registry-security")), Arc::new(Plain("A"))];
        let chain =
            InterceptorOrderingPolicy::build_chain(&ClientConfiguration::new(), available, None);
        assert_eq!(names(&chain), vec!["A"]);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let build = || -> Vec<Arc<dyn Interceptor>> {
            vec![
                Arc::new(Plain("A")),
                Arc::new(Security("S")),
                Arc::new(Plain("B")),
                Arc::new(Plain("C")),
            ]
        };
        let first = InterceptorOrderingPolicy::order(build(), None);
        let second = InterceptorOrderingPolicy::order(build(), None);
        assert_eq!(names(&first), names(&second));
    }
}
