//! Product family catalog

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One member of the Optimizely product family.
///
/// Declaration order is significant: it is the final tie-break wherever
/// products are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Product {
    ConfiguredCommerce,
    CommerceConnect,
    CmsPaas,
    CmsSaas,
    Experimentation,
    DataPlatform,
}

impl Product {
    /// All products in declaration order
    pub const ALL: [Product; 6] = [
        Product::ConfiguredCommerce,
        Product::CommerceConnect,
        Product::CmsPaas,
        Product::CmsSaas,
        Product::Experimentation,
        Product::DataPlatform,
    ];

    /// Stable kebab-case identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::ConfiguredCommerce => "configured-commerce",
            Self::CommerceConnect => "commerce-connect",
            Self::CmsPaas => "cms-paas",
            Self::CmsSaas => "cms-saas",
            Self::Experimentation => "experimentation",
            Self::DataPlatform => "data-platform",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ConfiguredCommerce => "Configured Commerce",
            Self::CommerceConnect => "Commerce Connect",
            Self::CmsPaas => "CMS (PaaS)",
            Self::CmsSaas => "SaaS CMS",
            Self::Experimentation => "Feature Experimentation",
            Self::DataPlatform => "Optimizely Data Platform",
        }
    }

    /// Position in declaration order
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Static best-practice guidance shown in curated responses
    pub fn best_practices(&self) -> &'static [&'static str] {
        match self {
            Self::ConfiguredCommerce => &[
                "Extend pricing, tax and shipping through handler chains instead of modifying base services",
                "Keep Spire blueprint customizations in your own blueprint folder so upgrades stay mechanical",
                "Register custom handlers with an explicit Order so they run at a predictable point in the chain",
            ],
            Self::CommerceConnect => &[
                "Access orders through IOrderRepository and the order abstractions rather than Mediachase APIs",
                "Run promotions through the promotion engine so discounts stay auditable",
                "Keep catalog content types thin and move pricing logic into price services",
            ],
            Self::CmsPaas => &[
                "Model content with strongly typed page and block types and keep views free of business logic",
                "Use IContentLoader for reads and IContentRepository only where content is written",
                "Register services in Startup and avoid the ServiceLocator outside legacy integration points",
            ],
            Self::CmsSaas => &[
                "Query content through Optimizely Graph and cache responses at the edge",
                "Keep content type definitions in source control and sync them as part of deployment",
                "Use preview tokens only on preview routes and never expose them to public clients",
            ],
            Self::Experimentation => &[
                "Initialize the SDK client once per process and reuse it for every decision",
                "Pass a stable user id and the same attributes to every decide call",
                "Track conversion events through the SDK so results stay attributable to variations",
            ],
            Self::DataPlatform => &[
                "Send identifiers consistently so customer profiles merge correctly",
                "Batch event uploads and respect the platform rate limits",
            ],
        }
    }

    /// Rule-file directives proposed when a project lacks guidance for the product
    pub fn rule_templates(&self) -> &'static [&'static str] {
        match self {
            Self::ConfiguredCommerce => &[
                "Implement Configured Commerce customizations as handlers or pipes, never by editing platform code",
                "Place Spire frontend customizations under a custom blueprint",
            ],
            Self::CommerceConnect => &[
                "Use Commerce Connect order abstractions (IOrderRepository, IOrderGroup) for cart and order work",
                "Apply discounts through the Commerce Connect promotion engine",
            ],
            Self::CmsPaas => &[
                "Define Optimizely CMS content with typed page and block models",
                "Read CMS content with IContentLoader and keep controllers thin",
            ],
            Self::CmsSaas => &[
                "Fetch SaaS CMS content through Optimizely Graph queries",
                "Version SaaS CMS content type definitions in source control",
            ],
            Self::Experimentation => &[
                "Create one Optimizely Feature Experimentation client per process and reuse it",
                "Always pass a stable user id to feature flag decisions",
            ],
            Self::DataPlatform => &[
                "Send Optimizely Data Platform events with consistent customer identifiers",
            ],
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Product::ALL
            .iter()
            .copied()
            .find(|p| p.id() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown product: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_ids_round_trip() {
        for product in Product::ALL {
            assert_eq!(product.id().parse::<Product>().unwrap(), product);
        }
        assert!("commerce".parse::<Product>().is_err());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Product::ConfiguredCommerce).unwrap();
        assert_eq!(json, "\"configured-commerce\"");
    }

    #[test]
    fn test_ordinal_follows_declaration_order() {
        let ordinals: Vec<usize> = Product::ALL.iter().map(Product::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5]);
    }
}
