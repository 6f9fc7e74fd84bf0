use std::collections::BTreeSet;

/// Fixed vocabulary of domain nouns recognized in query text. Each entry maps
/// one or more surface forms to the canonical entity type tag.
const ENTITY_VOCABULARY: &[(&str, &[&str])] = &[
    ("company", &["company", "companies", "startup", "startups", "firm", "firms"]),
    ("product", &["product", "products"]),
    ("investor", &["investor", "investors", "vc", "venture capital"]),
    ("person", &["person", "people", "founder", "founders", "ceo", "employee", "employees"]),
    ("fund", &["fund", "funds"]),
    ("industry", &["industry", "industries"]),
    ("market", &["market", "markets"]),
    ("sector", &["sector", "sectors"]),
    ("region", &["region", "regions", "country", "countries"]),
    ("customer", &["customer", "customers", "client", "clients"]),
    ("deal", &["deal", "deals", "transaction", "transactions"]),
    ("revenue", &["revenue", "sales", "income"]),
    ("investment", &["investment", "investments", "funding", "valuation"]),
];

/// Entity types whose presence suggests numeric/financial content, used as a
/// routing hint toward the aggregation path
const FINANCIAL_ENTITY_TYPES: &[&str] = &["fund", "investor", "deal", "revenue", "investment"];

/// Pull coarse entity-type tags from the query text. Purely advisory
/// metadata; deduplicated via the set.
pub fn extract_entity_types(query: &str) -> BTreeSet<String> {
    let normalized = query.to_lowercase();
    let mut found = BTreeSet::new();

    for (entity_type, surface_forms) in ENTITY_VOCABULARY {
        if surface_forms.iter().any(|f| normalized.contains(f)) {
            found.insert((*entity_type).to_string());
        }
    }

    found
}

/// Whether any extracted entity type hints at numeric/financial content
pub fn has_financial_entities(entity_types: &BTreeSet<String>) -> bool {
    FINANCIAL_ENTITY_TYPES.iter().any(|t| entity_types.contains(*t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_entity_types() {
        let types = extract_entity_types("Which investors funded companies in the fintech sector?");
        assert!(types.contains("investor"));
        assert!(types.contains("company"));
        assert!(types.contains("sector"));
    }

    #[test]
    fn deduplicates_repeated_mentions() {
        let types = extract_entity_types("company company companies");
        assert_eq!(types.len(), 1);
    }

    #[test]
    fn unknown_text_yields_empty_set() {
        assert!(extract_entity_types("What is the weather?").is_empty());
    }

    #[test]
    fn financial_hint() {
        let types = extract_entity_types("Total revenue across all funds");
        assert!(has_financial_entities(&types));
        let types = extract_entity_types("Tell me about the product roadmap");
        assert!(!has_financial_entities(&types));
    }
}
