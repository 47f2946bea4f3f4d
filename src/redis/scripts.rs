//! Lua scripts for atomic Redis operations
//!
//! Scripts run without interleaving other clients, which turns a
//! read-then-write sequence into a single step.

use redis::Script;

/// Remove a member from index sets unless its record exists
///
/// KEYS[1] is the record key, KEYS[2..] the index keys; ARGV[1] the member.
/// Returns the number of sets the member was removed from.
const ZREM_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local removed = 0
for i = 2, #KEYS do
    removed = removed + redis.call('ZREM', KEYS[i], ARGV[1])
end
return removed
"#;

/// Scripts loaded by a pool
pub struct LuaScripts {
    zrem_if_absent: Script,
}

impl LuaScripts {
    /// Hash every script once
    pub fn new() -> Self {
        Self {
            zrem_if_absent: Script::new(ZREM_IF_ABSENT),
        }
    }

    /// Conditional index cleanup; see [`crate::engine::traits::Connection::zrem_if_absent`]
    pub fn zrem_if_absent(&self) -> &Script {
        &self.zrem_if_absent
    }
}

impl Default for LuaScripts {
    fn default() -> Self {
        Self::new()
    }
}
