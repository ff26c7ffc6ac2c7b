// ============================================================================
// Fixed Identities
// ============================================================================
//
// These are part of the contract with the rest of the cluster and are not
// runtime-configurable. Tunables live in `config::ControllerConfig`.
//
// ============================================================================

/// Name of the canonical trusted CA bundle config map
pub const TRUSTED_CA_BUNDLE_CONFIGMAP: &str = "trusted-ca-bundle";

/// Namespace of the canonical trusted CA bundle config map
pub const TRUSTED_CA_BUNDLE_CONFIGMAP_NS: &str = "openshift-config-managed";

/// Data key holding the PEM bundle, both in the source and in every target
pub const TRUSTED_CA_BUNDLE_CONFIGMAP_KEY: &str = "ca-bundle.crt";

/// Label that opts a config map into injection
pub const TRUSTED_CA_BUNDLE_CONFIGMAP_LABEL: &str = "config.openshift.io/inject-trusted-cabundle";

/// Label value required for injection
pub const INJECT_LABEL_VALUE: &str = "true";

/// Field manager token used for every apply
pub const FIELD_MANAGER: &str = "configmap_ca";

/// Component id reported to the health registry
pub const INJECTOR_COMPONENT: &str = "InjectorConfig";

/// Target failures after which a pass gives up on the remaining targets
pub const MAX_TARGET_FAILURES: usize = 5;

/// Controller name used in logs
pub const CONTROLLER_NAME: &str = "configmap-trust-bundle-injector-controller";
