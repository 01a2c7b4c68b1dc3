//! Token substitution rules applied to cmx templates.
//!
//! Each rule owns one marker and derives its replacement from the template's
//! [`PackageName`]. Rules are pure text transforms; a rule whose marker does
//! not occur in the text leaves it untouched.

use std::path::Path;

use crate::package::PackageName;

pub trait SubstitutionRule: Send + Sync {
    /// Literal marker replaced by this rule.
    fn marker(&self) -> &'static str;

    /// Replacement for the marker, or `None` when the package name is too
    /// short to derive one.
    fn value(&self, package: &PackageName) -> Option<String>;

    fn apply(&self, text: &str, file: &Path, root: &Path) -> String {
        if !text.contains(self.marker()) {
            return text.to_string();
        }
        let package = PackageName::derive(root, file);
        match self.value(&package) {
            Some(value) => text.replace(self.marker(), &value),
            None => {
                tracing::warn!(
                    marker = self.marker(),
                    package = %package,
                    file = %file.display(),
                    "cannot derive substitution value, leaving marker in place"
                );
                text.to_string()
            }
        }
    }
}

/// `$$` → second package segment.
pub struct ShortcutExtensionName;

impl SubstitutionRule for ShortcutExtensionName {
    fn marker(&self) -> &'static str {
        "$$"
    }

    fn value(&self, package: &PackageName) -> Option<String> {
        package.segment(1).map(str::to_string)
    }
}

/// `$dynamicPackageName` → the full package name.
pub struct DynamicPackageName;

impl SubstitutionRule for DynamicPackageName {
    fn marker(&self) -> &'static str {
        "$dynamicPackageName"
    }

    fn value(&self, package: &PackageName) -> Option<String> {
        Some(package.as_str().to_string())
    }
}

/// `$customExtensionName` → second package segment.
pub struct CustomExtensionName;

impl SubstitutionRule for CustomExtensionName {
    fn marker(&self) -> &'static str {
        "$customExtensionName"
    }

    fn value(&self, package: &PackageName) -> Option<String> {
        package.segment(1).map(str::to_string)
    }
}

/// `$parentPackageName` → package name without its last segment.
pub struct ParentPackageName;

impl SubstitutionRule for ParentPackageName {
    fn marker(&self) -> &'static str {
        "$parentPackageName"
    }

    fn value(&self, package: &PackageName) -> Option<String> {
        Some(package.parent())
    }
}

/// `$rootExtensionPackage` → first two package segments.
pub struct RootExtensionPackage;

impl SubstitutionRule for RootExtensionPackage {
    fn marker(&self) -> &'static str {
        "$rootExtensionPackage"
    }

    fn value(&self, package: &PackageName) -> Option<String> {
        package.prefix(2)
    }
}

/// The rule set in application order.
#[must_use]
pub fn default_rules() -> Vec<Box<dyn SubstitutionRule>> {
    vec![
        Box::new(ShortcutExtensionName),
        Box::new(DynamicPackageName),
        Box::new(CustomExtensionName),
        Box::new(ParentPackageName),
        Box::new(RootExtensionPackage),
    ]
}
