//! ** idgen module **
//! Namespaces and helpers for stable v5 uuids. Item instances created during play and
//! by the story generator get deterministic ids, so replaying the same choices against the
//! same state yields the same instances.
//! Save records use v4 (random) UUIDs instead.
use uuid::Uuid;

pub const NAMESPACE_ITEM_INSTANCE: Uuid = uuid::uuid!("5b0a8c1e-7d43-4e0f-9a61-2c8f3d7e4b19");

pub const NAMESPACE_GENERATED: Uuid = uuid::uuid!("c3e9f1a2-4b6d-4f88-8e2a-91d7b05c6a34");

/// Generate a v5 UUID for a token within a namespace.
pub fn uuid_from_token(namespace: &Uuid, token: &str) -> Uuid {
    Uuid::new_v5(namespace, token.as_bytes())
}

/// Instance uid for the `n`th run-time copy of an item template.
pub fn instance_uid(template_id: &str, n: usize) -> String {
    uuid_from_token(&NAMESPACE_ITEM_INSTANCE, &format!("{template_id}#{n}")).to_string()
}

/// Instance uid for loot rolled by the generator for a given seed and node.
pub fn generated_instance_uid(seed: u64, node_id: &str) -> String {
    uuid_from_token(&NAMESPACE_GENERATED, &format!("{seed}:{node_id}")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_uids_are_stable_and_distinct() {
        assert_eq!(instance_uid("sword", 0), instance_uid("sword", 0));
        assert_ne!(instance_uid("sword", 0), instance_uid("sword", 1));
        assert_ne!(instance_uid("sword", 0), generated_instance_uid(0, "sword"));
    }
}
