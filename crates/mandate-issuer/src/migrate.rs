// Path: crates/mandate-issuer/src/migrate.rs

//! v1→v2 schema migration (§4.6). Lossless except that a migrated token
//! gets a freshly generated nonce (the v1 nonce may already be consumed
//! or tracked under assumptions the v2 nonce store doesn't share) and an
//! `org="legacy"` tag so a verifier can filter these out by policy.

use mandate_types::mandate::{MandateToken, CURRENT_MANDATE_SCHEMA};

pub fn migrate_v1(mut token: MandateToken, fresh_nonce: String) -> MandateToken {
    token.version = CURRENT_MANDATE_SCHEMA;
    token.nonce = fresh_nonce;
    token.org = Some("legacy".to_string());
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandate_types::constraints::Constraints;
    use mandate_types::ids::{Did, TokenId};
    use mandate_types::mandate::MANDATE_SCHEMA_V1;

    fn v1_token() -> MandateToken {
        let now = chrono::Utc::now();
        MandateToken {
            version: MANDATE_SCHEMA_V1,
            token_id: TokenId::new(),
            issuer: Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap(),
            subject: Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap(),
            audience: "checkout-service".to_string(),
            organization_id: "org-1".to_string(),
            issued_at: now,
            not_before: None,
            expires_at: now + chrono::Duration::seconds(300),
            nonce: "stale-nonce".to_string(),
            delegation_chain_ids: vec![],
            permissions: vec!["transact".to_string()],
            constraints: Constraints::default(),
            custom_claims: Default::default(),
            org: None,
        }
    }

    #[test]
    fn migration_bumps_version_and_tags_legacy() {
        let migrated = migrate_v1(v1_token(), "fresh-nonce".to_string());
        assert_eq!(migrated.version, CURRENT_MANDATE_SCHEMA);
        assert_eq!(migrated.nonce, "fresh-nonce");
        assert!(migrated.is_legacy());
    }

    #[test]
    fn migration_preserves_every_other_claim() {
        let original = v1_token();
        let token_id = original.token_id;
        let permissions = original.permissions.clone();
        let migrated = migrate_v1(original, "fresh-nonce".to_string());
        assert_eq!(migrated.token_id, token_id);
        assert_eq!(migrated.permissions, permissions);
    }
}
