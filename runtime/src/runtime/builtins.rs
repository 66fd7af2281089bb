use num_derive::FromPrimitive;

/// Identifies the builtin actor types for usage with the
/// actor_code_cid/resolve_builtin_actor_type runtime operations.
#[derive(PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Debug, FromPrimitive, Hash)]
#[repr(i32)]
pub enum Type {
    System = 1,
    Init = 2,
    Cron = 3,
    Account = 4,
    Power = 5,
    Miner = 6,
    Market = 7,
    Multisig = 8,
    Token = 9,
    Bounty = 10,
    BountyStream = 11,
}

impl Type {
    pub fn name(&self) -> &'static str {
        match *self {
            Type::System => "system",
            Type::Init => "init",
            Type::Cron => "cron",
            Type::Account => "account",
            Type::Power => "storagepower",
            Type::Miner => "storageminer",
            Type::Market => "storagemarket",
            Type::Multisig => "multisig",
            Type::Token => "token",
            Type::Bounty => "bounty",
            Type::BountyStream => "bountystream",
        }
    }
}
