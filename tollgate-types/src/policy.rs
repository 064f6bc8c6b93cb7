//! Policies: the configuration template every license is issued under.

use chrono::{DateTime, Utc};
use tollgate_crypto::{CryptoResult, KeyPair, Scheme};

use crate::ids::{PolicyId, ProductId, TenantId};
use crate::Metadata;

/// Seconds between heartbeats before a machine is considered dead.
pub const DEFAULT_HEARTBEAT_DURATION: u64 = 10 * 60;

wire_enum! {
    /// How often a license must check in when `require_check_in` is set.
    pub enum CheckInInterval {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Yearly => "yearly",
    }
}

wire_enum! {
    /// What an expired license still permits.
    pub enum ExpirationStrategy {
        /// Validation fails but checkout is allowed.
        Restrict => "restrict",
        /// Expired licenses cannot be checked out.
        Revoke => "revoke",
        Maintain => "maintain",
        Allow => "allow",
    }
}

wire_enum! {
    /// Event an expiry is recorded relative to.
    pub enum ExpirationBasis {
        FromCreation => "from_creation",
        FromFirstActivation => "from_first_activation",
        FromFirstValidation => "from_first_validation",
        FromFirstUse => "from_first_use",
    }
}

wire_enum! {
    /// How a renewal moves the expiry.
    pub enum RenewalBasis {
        FromExpiry => "from_expiry",
        FromNow => "from_now",
        FromNowIfExpired => "from_now_if_expired",
    }
}

wire_enum! {
    /// Whether exceeding a use or machine limit is tolerated.
    pub enum OverageStrategy {
        NoOverage => "no_overage",
        AlwaysAllow => "always_allow",
    }
}

wire_enum! {
    /// When the heartbeat clock starts for a new machine.
    pub enum HeartbeatBasis {
        FromCreation => "from_creation",
        FromFirstPing => "from_first_ping",
    }
}

wire_enum! {
    /// What happens to a machine whose heartbeat has died.
    pub enum HeartbeatCullStrategy {
        DeactivateDead => "deactivate_dead",
        KeepDead => "keep_dead",
    }
}

wire_enum! {
    /// Whether a dead machine may come back by pinging again.
    pub enum HeartbeatResurrectionStrategy {
        NoRevive => "no_revive",
        AlwaysRevive => "always_revive",
    }
}

/// A product's licensing policy.
///
/// Numeric limits use 0 for "unlimited"; `duration` 0 means licenses never
/// expire. The key pair belongs to the scheme it was generated under; use
/// [`Policy::change_scheme`] rather than assigning `scheme` directly.
#[derive(Debug, Clone)]
pub struct Policy {
    pub id: PolicyId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub scheme: Scheme,
    pub keys: KeyPair,
    /// License lifetime in seconds.
    pub duration: u64,
    pub max_machines: u32,
    pub max_uses: u32,
    pub max_users: u32,
    pub check_in_interval: Option<CheckInInterval>,
    pub require_check_in: bool,
    pub expiration_strategy: ExpirationStrategy,
    pub expiration_basis: ExpirationBasis,
    pub renewal_basis: RenewalBasis,
    pub overage_strategy: OverageStrategy,
    /// Seconds a machine may go without pinging.
    pub heartbeat_duration: u64,
    pub require_heartbeat: bool,
    pub heartbeat_basis: HeartbeatBasis,
    pub heartbeat_cull_strategy: HeartbeatCullStrategy,
    pub heartbeat_resurrection_strategy: HeartbeatResurrectionStrategy,
    /// Forces certificate encryption on checkout.
    pub encrypted: bool,
    pub protected: bool,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Creates a policy with default strategies and a fresh key pair.
    pub fn new(
        tenant_id: TenantId,
        product_id: ProductId,
        name: impl Into<String>,
        scheme: Scheme,
    ) -> CryptoResult<Self> {
        let keys = scheme.generate_key_pair()?;
        let now = Utc::now();
        Ok(Self {
            id: PolicyId::new(),
            tenant_id,
            product_id,
            name: name.into(),
            scheme,
            keys,
            duration: 0,
            max_machines: 0,
            max_uses: 0,
            max_users: 0,
            check_in_interval: None,
            require_check_in: false,
            expiration_strategy: ExpirationStrategy::Restrict,
            expiration_basis: ExpirationBasis::FromCreation,
            renewal_basis: RenewalBasis::FromExpiry,
            overage_strategy: OverageStrategy::NoOverage,
            heartbeat_duration: DEFAULT_HEARTBEAT_DURATION,
            require_heartbeat: false,
            heartbeat_basis: HeartbeatBasis::FromFirstPing,
            heartbeat_cull_strategy: HeartbeatCullStrategy::DeactivateDead,
            heartbeat_resurrection_strategy: HeartbeatResurrectionStrategy::NoRevive,
            encrypted: false,
            protected: false,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Switches to another scheme, regenerating keys.
    ///
    /// Certificates issued under the old keys no longer verify. Switching to
    /// the current scheme is a no-op.
    pub fn change_scheme(&mut self, scheme: Scheme) -> CryptoResult<()> {
        if scheme == self.scheme {
            return Ok(());
        }
        self.keys = scheme.generate_key_pair()?;
        self.scheme = scheme;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replaces the key pair under the current scheme.
    pub fn regenerate_keys(&mut self) -> CryptoResult<()> {
        self.keys = self.scheme.generate_key_pair()?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns the public key certificates are verified with.
    #[must_use]
    pub fn public_key(&self) -> &str {
        self.keys.public_key()
    }

    #[must_use]
    pub fn allows_overage(&self) -> bool {
        self.overage_strategy == OverageStrategy::AlwaysAllow
    }

    /// A node-locked policy allows exactly one machine; anything else floats.
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.max_machines != 1
    }
}
