//! Crime and law: the player's criminal record, bounties, and jail.
//!
//! - Every crime is recorded with its region, severity, and whether it was
//!   witnessed. Reputation drops by `severity * rep_loss_base_factor`,
//!   multiplied again when witnessed, never below -100.
//! - Witnessed crimes add a bounty in their region and raise guard
//!   suspicion there. A witnessed crime above `wanted_threshold` makes the
//!   player wanted in that region.
//! - Guard suspicion decays every hour. Guards arrest a wanted player whose
//!   region suspicion is at its maximum. An arrest converts the region's
//!   unpaid crimes into a jail sentence and clears its bounty.
//! - Paying a bounty needs enough gold. It clears the region and restores a
//!   little reputation. Each day served in jail restores reputation too.
//!
//! The automaton mirrors the player's status in the current region:
//! `lawful`, `wanted`, or `jailed`.

use std::collections::{BTreeMap, BTreeSet};

use oath_core::config::CrimeConfig;
use oath_core::plugin::{BountyLedger, decode_state};
use oath_core::{
    Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome, WorldContext,
};
use oath_types::{CrimeId, CrimeKind, GameEvent, TransitionInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::node_name;

/// Registry name of the crime system.
pub const SYSTEM: &str = "crime";

/// Lowest criminal reputation.
pub const REPUTATION_FLOOR: i32 = -100;

/// Highest criminal reputation.
pub const REPUTATION_CEILING: i32 = 100;

/// Guard suspicion at which a wanted player is arrested.
pub const ARREST_SUSPICION: u32 = 100;

/// Reputation restored by paying a bounty.
const BOUNTY_PAYMENT_REP_BONUS: i32 = 10;

const LAWFUL: &str = "lawful";
const WANTED: &str = "wanted";
const JAILED: &str = "jailed";

/// One crime on the player's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeRecord {
    /// Unique identifier.
    pub id: CrimeId,
    /// What was done.
    pub kind: CrimeKind,
    /// Where it was done.
    pub region: String,
    /// Severity on a 1-10 scale.
    pub severity: u32,
    /// Whether anyone saw it.
    pub witnessed: bool,
    /// Day it was committed.
    pub day: u32,
    /// Whether it has been settled by bounty or jail time.
    pub paid: bool,
}

/// A jail sentence being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JailTerm {
    /// Region whose jail holds the player.
    pub region: String,
    /// Days left to serve.
    pub days_remaining: u32,
}

/// The durable state of the crime system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CriminalRecord {
    /// Every crime committed, oldest first.
    pub crimes: Vec<CrimeRecord>,
    /// Outstanding bounty per region.
    pub bounties: BTreeMap<String, i64>,
    /// Criminal reputation, -100 to 100.
    pub reputation: i32,
    /// Regions where guards arrest on sight.
    pub wanted: BTreeSet<String>,
    /// The sentence being served, if any.
    pub jail: Option<JailTerm>,
    /// Guard suspicion per region, 0 to [`ARREST_SUSPICION`].
    pub suspicion: BTreeMap<String, u32>,
}

/// What recording a crime did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrimeOutcome {
    /// The new record entry.
    pub id: CrimeId,
    /// Reputation lost.
    pub reputation_loss: i32,
    /// Bounty added in the crime's region.
    pub bounty_added: i64,
    /// Whether this crime made the player wanted.
    pub became_wanted: bool,
}

/// Keeps the criminal record and drives the law automaton.
#[derive(Debug, Clone)]
pub struct CrimeSystem {
    config: CrimeConfig,
    record: CriminalRecord,
}

impl CrimeSystem {
    /// Create a crime system with a clean record.
    pub fn new(config: &CrimeConfig) -> Self {
        Self {
            config: config.clone(),
            record: CriminalRecord::default(),
        }
    }

    /// The full record.
    pub const fn record(&self) -> &CriminalRecord {
        &self.record
    }

    /// Every crime on record, oldest first.
    pub fn crimes(&self) -> &[CrimeRecord] {
        &self.record.crimes
    }

    /// The sentence being served, if any.
    pub const fn jail_term(&self) -> Option<&JailTerm> {
        self.record.jail.as_ref()
    }

    /// Guard suspicion in `region`.
    pub fn suspicion(&self, region: &str) -> u32 {
        self.record.suspicion.get(region).copied().unwrap_or(0)
    }

    /// Jail days a single crime earns.
    pub fn jail_days_for(&self, kind: CrimeKind, severity: u32) -> u32 {
        let per_point = match kind {
            CrimeKind::Murder => self.config.murder_days_per_point,
            CrimeKind::Assault => self.config.assault_days_per_point,
            CrimeKind::Theft | CrimeKind::Pickpocketing => self.config.theft_days_per_point,
            CrimeKind::Trespassing | CrimeKind::Vandalism | CrimeKind::PrisonBreak => {
                self.config.minor_days_per_point
            }
        };
        per_point
            .saturating_mul(severity)
            .min(self.config.max_jail_days)
    }

    /// Add a crime to the record.
    pub fn record_crime(
        &mut self,
        kind: CrimeKind,
        region: &str,
        severity: u32,
        witnessed: bool,
        day: u32,
    ) -> CrimeOutcome {
        let severity_points = i32::try_from(severity).unwrap_or(i32::MAX);
        let mut loss = severity_points.saturating_mul(self.config.rep_loss_base_factor);
        if witnessed {
            loss = loss.saturating_mul(self.config.witness_rep_multiplier);
        }
        self.record.reputation = self
            .record
            .reputation
            .saturating_sub(loss)
            .max(REPUTATION_FLOOR);

        let mut bounty_added = 0;
        let mut became_wanted = false;
        if witnessed {
            bounty_added = self
                .config
                .bounty_per_severity
                .saturating_mul(i64::from(severity));
            let bounty = self.record.bounties.entry(region.to_owned()).or_insert(0);
            *bounty = bounty.saturating_add(bounty_added);

            let suspicion = self.record.suspicion.entry(region.to_owned()).or_insert(0);
            *suspicion = suspicion
                .saturating_add(self.config.suspicion_per_witness.saturating_mul(severity))
                .min(ARREST_SUSPICION);

            if severity > self.config.wanted_threshold {
                became_wanted = self.record.wanted.insert(region.to_owned());
            }
        }

        let id = CrimeId::new();
        self.record.crimes.push(CrimeRecord {
            id,
            kind,
            region: region.to_owned(),
            severity,
            witnessed,
            day,
            paid: false,
        });
        CrimeOutcome {
            id,
            reputation_loss: loss,
            bounty_added,
            became_wanted,
        }
    }

    /// Pay off the bounty in `region` out of `gold`. Returns the amount paid.
    ///
    /// # Errors
    ///
    /// Rejects the payment when there is no bounty or not enough gold; the
    /// record is untouched in that case.
    pub fn pay_bounty(&mut self, region: &str, gold: i64) -> Result<i64, PluginError> {
        let bounty = self.bounty(region);
        if bounty <= 0 {
            return Err(PluginError::rejected(format!("no bounty in {region}")));
        }
        if gold < bounty {
            return Err(PluginError::rejected(format!(
                "bounty of {bounty} gold exceeds the {gold} gold on hand"
            )));
        }
        self.settle_region(region);
        self.record.reputation = self
            .record
            .reputation
            .saturating_add(BOUNTY_PAYMENT_REP_BONUS)
            .min(REPUTATION_CEILING);
        Ok(bounty)
    }

    /// Arrest the player in `region`. Returns the sentence in days, or
    /// `None` if the player is already in jail.
    pub fn arrest(&mut self, region: &str) -> Option<u32> {
        if self.record.jail.is_some() {
            return None;
        }
        let days = self
            .record
            .crimes
            .iter()
            .filter(|crime| !crime.paid && crime.region == region)
            .fold(0_u32, |total, crime| {
                total.saturating_add(self.jail_days_for(crime.kind, crime.severity))
            })
            .clamp(1, self.config.max_jail_days.max(1));
        self.settle_region(region);
        self.record.jail = Some(JailTerm {
            region: region.to_owned(),
            days_remaining: days,
        });
        Some(days)
    }

    /// Serve one day of a jail sentence. Returns `Some(true)` on release,
    /// `Some(false)` while still jailed, `None` when not jailed.
    pub fn serve_day(&mut self) -> Option<bool> {
        let term = self.record.jail.as_mut()?;
        term.days_remaining = term.days_remaining.saturating_sub(1);
        let released = term.days_remaining == 0;
        self.regain_reputation(1);
        if released {
            self.record.jail = None;
        }
        Some(released)
    }

    /// Serve the rest of a sentence at once. Returns the days served.
    pub fn serve_sentence(&mut self) -> Option<u32> {
        let term = self.record.jail.take()?;
        self.regain_reputation(term.days_remaining);
        Some(term.days_remaining)
    }

    /// Reduce guard suspicion everywhere by `amount`, forgetting regions that
    /// reach zero. Returns whether anything changed.
    pub fn decay_suspicion(&mut self, amount: u32) -> bool {
        if amount == 0 || self.record.suspicion.is_empty() {
            return false;
        }
        for level in self.record.suspicion.values_mut() {
            *level = level.saturating_sub(amount);
        }
        self.record.suspicion.retain(|_, level| *level > 0);
        true
    }

    fn regain_reputation(&mut self, days: u32) {
        let days = i32::try_from(days).unwrap_or(i32::MAX);
        self.record.reputation = self
            .record
            .reputation
            .saturating_add(days.saturating_mul(self.config.rep_gain_per_day))
            .min(REPUTATION_CEILING);
    }

    fn settle_region(&mut self, region: &str) {
        for crime in &mut self.record.crimes {
            if crime.region == region {
                crime.paid = true;
            }
        }
        self.record.bounties.remove(region);
        self.record.wanted.remove(region);
        self.record.suspicion.remove(region);
    }

    fn mirror(&self, world: &mut WorldContext) {
        world.crime.bounty_by_region = self.record.bounties.clone();
        world.crime.wanted_in = self.record.wanted.clone();
        world.crime.jailed_in = self.record.jail.as_ref().map(|term| term.region.clone());
    }

    fn node(status: &str) -> String {
        node_name(SYSTEM, status)
    }

    /// The status node the record implies for the current region.
    fn desired_status(&self, world: &WorldContext) -> &'static str {
        if self.record.jail.is_some() {
            JAILED
        } else if self.is_wanted(world.current_region()) {
            WANTED
        } else {
            LAWFUL
        }
    }

    /// Walk the automaton to the status the record implies.
    fn sync(&self, ctx: &mut SystemContext<'_>) -> Result<TransitionOutcome, PluginError> {
        self.mirror(ctx.world);
        let desired = Self::node(self.desired_status(ctx.world));
        let start = ctx.controller.current_node(SYSTEM);

        // jailed -> wanted takes two steps (release, then become wanted).
        for _ in 0..2 {
            let Some(current) = ctx.controller.current_node_name(SYSTEM) else {
                break;
            };
            if current == desired {
                break;
            }
            let from_jail = current == Self::node(JAILED);
            let kind = if desired == Self::node(JAILED) {
                "arrest"
            } else if from_jail {
                "release"
            } else if desired == Self::node(WANTED) {
                "become_wanted"
            } else {
                "pardon"
            };
            ctx.process_input(SYSTEM, &TransitionInput::new(kind))?;
        }

        let next = ctx
            .controller
            .current_node(SYSTEM)
            .ok_or_else(|| PluginError::rejected("crime automaton has no current node"))?;
        let changed = start != Some(next);
        Ok(TransitionOutcome {
            handled: changed,
            next,
            changed,
        })
    }

    fn arrest_and_announce(&mut self, region: &str, ctx: &mut SystemContext<'_>) -> Option<u32> {
        let jail_days = self.arrest(region)?;
        info!(region, jail_days, "player arrested");
        ctx.emit(GameEvent::ArrestOccurred {
            region: region.to_owned(),
            jail_days,
        });
        Some(jail_days)
    }

    fn region_param(input: &TransitionInput, world: &WorldContext) -> String {
        input
            .text("region")
            .unwrap_or_else(|| world.current_region())
            .to_owned()
    }

    fn crime_from_input(input: &TransitionInput) -> Result<(CrimeKind, u32, bool), PluginError> {
        let name = input.text("crime").ok_or_else(|| PluginError::MissingField {
            field: "crime".to_owned(),
        })?;
        let kind = name
            .parse::<CrimeKind>()
            .map_err(|err| PluginError::InvalidField {
                field: "crime".to_owned(),
                reason: err.to_string(),
            })?;
        let severity = input
            .int("severity")
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| (1..=10).contains(value))
            .ok_or_else(|| PluginError::InvalidField {
                field: "severity".to_owned(),
                reason: "severity must be between 1 and 10".to_owned(),
            })?;
        Ok((kind, severity, input.flag("witnessed").unwrap_or(false)))
    }
}

impl SystemPlugin for CrimeSystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Criminal record, bounties, and jail"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let lawful = ctx.controller.create_node(Self::node(LAWFUL))?;
        let wanted = ctx.controller.create_node(Self::node(WANTED))?;
        let jailed = ctx.controller.create_node(Self::node(JAILED))?;

        let c = &mut *ctx.controller;
        c.add_transition(lawful, |i| i.is("become_wanted"), wanted, "guards want you")?;
        c.add_transition(lawful, |i| i.is("arrest"), jailed, "arrested")?;
        c.add_transition(wanted, |i| i.is("pardon"), lawful, "record cleared")?;
        c.add_transition(wanted, |i| i.is("arrest"), jailed, "arrested")?;
        c.add_transition(jailed, |i| i.is("release"), lawful, "released from jail")?;

        if let Some(node) = c.node_mut(wanted) {
            node.add_action(Action::fixed(
                "pay_bounty",
                "Pay off your bounty",
                TransitionInput::new("pay_bounty"),
            ));
            node.add_action(Action::fixed(
                "surrender",
                "Surrender to the guards",
                TransitionInput::new("surrender"),
            ));
        }
        if let Some(node) = c.node_mut(jailed) {
            node.add_action(Action::fixed(
                "serve_sentence",
                "Serve out your sentence",
                TransitionInput::new("serve_sentence"),
            ));
        }
        c.set_system_root(SYSTEM, lawful)?;
        self.mirror(ctx.world);
        Ok(())
    }

    fn tick(&mut self, _delta: f64, _ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn handle_input(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        match input.kind.as_str() {
            "commit_crime" => {
                let (crime, severity, witnessed) = Self::crime_from_input(input)?;
                ctx.emit(GameEvent::CrimeCommitted {
                    crime,
                    region: Self::region_param(input, ctx.world),
                    severity,
                    witnessed,
                });
                self.sync(ctx)
            }
            "pay_bounty" => {
                let region = Self::region_param(input, ctx.world);
                let amount = self.pay_bounty(&region, ctx.world.economy.gold)?;
                info!(region = %region, amount, "bounty paid");
                ctx.emit(GameEvent::BountyPaid {
                    region,
                    amount,
                });
                ctx.emit(GameEvent::TransactionCompleted {
                    item: "bounty".to_owned(),
                    gold_delta: amount.saturating_neg(),
                });
                self.sync(ctx)
            }
            "surrender" => {
                let region = Self::region_param(input, ctx.world);
                if !self.is_wanted(&region) {
                    return Err(PluginError::rejected(format!("not wanted in {region}")));
                }
                self.arrest_and_announce(&region, ctx)
                    .ok_or_else(|| PluginError::rejected("already in jail"))?;
                self.sync(ctx)
            }
            "serve_sentence" => {
                let days = self
                    .serve_sentence()
                    .ok_or_else(|| PluginError::rejected("not in jail"))?;
                info!(days, "sentence served");
                self.sync(ctx)
            }
            _ => ctx.process_input(SYSTEM, input).map_err(PluginError::from),
        }
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.record).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode criminal record");
            Value::Null
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let record: CriminalRecord = decode_state(state)?;
        if !(REPUTATION_FLOOR..=REPUTATION_CEILING).contains(&record.reputation) {
            return Err(PluginError::InvalidField {
                field: "reputation".to_owned(),
                reason: format!("{} is outside -100..=100", record.reputation),
            });
        }
        let previous = std::mem::replace(&mut self.record, record);
        let status = Self::node(self.desired_status(ctx.world));
        if let Err(err) = ctx.controller.restore_current(SYSTEM, &status) {
            self.record = previous;
            return Err(err.into());
        }
        self.mirror(ctx.world);
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        let handled = match event {
            GameEvent::CrimeCommitted {
                crime,
                region,
                severity,
                witnessed,
            } => {
                let day = ctx.world.world.days_passed;
                let outcome = self.record_crime(*crime, region, *severity, *witnessed, day);
                info!(
                    crime = %crime,
                    region = %region,
                    severity,
                    witnessed,
                    bounty_added = outcome.bounty_added,
                    became_wanted = outcome.became_wanted,
                    "crime recorded"
                );
                if outcome.reputation_loss > 0 {
                    ctx.emit(GameEvent::ReputationChanged {
                        faction: "guards".to_owned(),
                        delta: outcome.reputation_loss.saturating_neg(),
                    });
                }
                true
            }
            GameEvent::HourPassed { .. } => {
                let region = ctx.world.current_region().to_owned();
                let arrested = self.is_wanted(&region)
                    && self.suspicion(&region) >= ARREST_SUSPICION
                    && self.arrest_and_announce(&region, ctx).is_some();
                let decayed = self.decay_suspicion(self.config.suspicion_decay_per_hour);
                arrested || decayed
            }
            GameEvent::DayPassed { .. } => match self.serve_day() {
                Some(true) => {
                    info!("released from jail");
                    true
                }
                Some(false) => true,
                None => false,
            },
            _ => return false,
        };
        if let Err(err) = self.sync(ctx) {
            warn!(error = %err, "crime automaton out of sync");
        }
        handled
    }

    fn bounty_ledger(&self) -> Option<&dyn BountyLedger> {
        Some(self)
    }
}

impl BountyLedger for CrimeSystem {
    fn bounty(&self, region: &str) -> i64 {
        self.record.bounties.get(region).copied().unwrap_or(0)
    }

    fn total_bounty(&self) -> i64 {
        self.record
            .bounties
            .values()
            .fold(0_i64, |total, bounty| total.saturating_add(*bounty))
    }

    fn is_wanted(&self, region: &str) -> bool {
        self.record.wanted.contains(region)
    }

    fn criminal_reputation(&self) -> i32 {
        self.record.reputation
    }

    fn crime_count(&self) -> usize {
        self.record.crimes.len()
    }
}
