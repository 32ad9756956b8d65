//! Economy: the player's purse and the local market.
//!
//! Gold changes only when a [`GameEvent::TransactionCompleted`] reaches this
//! system. Buying and selling emit that event rather than touching the purse
//! directly, so purchases, bounty payments, and rewards from other systems
//! all go through one path and are mirrored into the shared economy context
//! the same way.
//!
//! Market prices drift at a fixed day interval, seeded per day so replays
//! reproduce the same prices. A storm over the current region marks every
//! quoted price up until the weather clears.

use std::collections::BTreeMap;

use oath_core::config::EconomyConfig;
use oath_core::plugin::{Treasury, decode_state};
use oath_core::{
    Action, PluginError, SystemContext, SystemPlugin, TransitionOutcome, WorldContext,
};
use oath_types::{GameEvent, TransitionInput, Weather};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::node_name;

/// Registry name of the economy system.
pub const SYSTEM: &str = "economy";

const IDLE: &str = "idle";
const MARKET: &str = "market";

/// The durable state of the economy system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ledger {
    /// Gold carried by the player.
    pub gold: i64,
    /// Market price per item before any weather markup.
    pub prices: BTreeMap<String, i64>,
    /// Items the player owns.
    pub inventory: BTreeMap<String, u32>,
    /// Day prices last drifted.
    pub last_drift_day: u32,
    /// Whether a storm is marking prices up.
    pub storm_markup: bool,
    /// Whether the player is standing in the market.
    pub at_market: bool,
}

/// Keeps the player's gold and the market's prices.
#[derive(Debug, Clone)]
pub struct EconomySystem {
    config: EconomyConfig,
    ledger: Ledger,
}

impl EconomySystem {
    /// Create an economy with the configured purse and base prices.
    pub fn new(config: &EconomyConfig) -> Self {
        Self {
            config: config.clone(),
            ledger: Ledger {
                gold: config.starting_gold,
                prices: config.base_prices.clone(),
                ..Ledger::default()
            },
        }
    }

    /// The full ledger.
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// How many of `item` the player owns.
    pub fn owned(&self, item: &str) -> u32 {
        self.ledger.inventory.get(item).copied().unwrap_or(0)
    }

    /// The price the market quotes for `item` right now.
    pub fn quote(&self, item: &str) -> Option<i64> {
        let price = *self.ledger.prices.get(item)?;
        if self.ledger.storm_markup {
            Some(Self::scale(price, self.config.storm_markup_pct))
        } else {
            Some(price)
        }
    }

    /// `price` changed by `pct` percent, never below 1.
    fn scale(price: i64, pct: i64) -> i64 {
        price
            .saturating_mul(100_i64.saturating_add(pct))
            .checked_div(100)
            .unwrap_or(price)
            .max(1)
    }

    /// Apply a signed gold change. The purse never goes below zero.
    pub fn apply_transaction(&mut self, gold_delta: i64) -> i64 {
        let wanted = self.ledger.gold.saturating_add(gold_delta);
        if wanted < 0 {
            warn!(gold = self.ledger.gold, gold_delta, "transaction overdraws the purse");
        }
        self.ledger.gold = wanted.max(0);
        self.ledger.gold
    }

    /// Check a purchase and take the goods. Returns the cost; the gold is
    /// debited when the resulting transaction is applied.
    pub fn buy(&mut self, item: &str, quantity: u32) -> Result<i64, PluginError> {
        let price = self
            .quote(item)
            .ok_or_else(|| PluginError::rejected(format!("the market does not sell {item}")))?;
        let cost = price.saturating_mul(i64::from(quantity));
        if cost > self.ledger.gold {
            return Err(PluginError::rejected(format!(
                "{quantity} {item} cost {cost} gold, only {} on hand",
                self.ledger.gold
            )));
        }
        let owned = self.ledger.inventory.entry(item.to_owned()).or_insert(0);
        *owned = owned.saturating_add(quantity);
        Ok(cost)
    }

    /// Check a sale and hand over the goods. Returns the proceeds (half the
    /// quoted price); the gold is credited when the transaction is applied.
    pub fn sell(&mut self, item: &str, quantity: u32) -> Result<i64, PluginError> {
        let owned = self.owned(item);
        if owned < quantity {
            return Err(PluginError::rejected(format!(
                "cannot sell {quantity} {item}, only {owned} owned"
            )));
        }
        let price = self
            .quote(item)
            .ok_or_else(|| PluginError::rejected(format!("the market does not buy {item}")))?;
        let proceeds = price
            .checked_div(2)
            .unwrap_or(0)
            .saturating_mul(i64::from(quantity));
        let left = owned.saturating_sub(quantity);
        if left == 0 {
            self.ledger.inventory.remove(item);
        } else {
            self.ledger.inventory.insert(item.to_owned(), left);
        }
        Ok(proceeds)
    }

    /// Whether prices are due to drift on `day`.
    pub fn drift_due(&self, day: u32) -> bool {
        let interval = self.config.price_drift_interval_days.max(1);
        day.saturating_sub(self.ledger.last_drift_day) >= interval
    }

    /// Move every price by up to `max_drift_pct` percent, staying within
    /// half and double its base price. Returns the items whose price moved.
    pub fn drift_prices(&mut self, day: u32, rng: &mut impl Rng) -> Vec<String> {
        let max_pct = self.config.max_drift_pct.abs();
        let mut moved = Vec::new();
        for (item, price) in &mut self.ledger.prices {
            let pct = rng.random_range(max_pct.saturating_neg()..=max_pct);
            let base = self.config.base_prices.get(item).copied().unwrap_or(*price);
            let floor = base.checked_div(2).unwrap_or(base).max(1);
            let ceiling = base.saturating_mul(2).max(floor);
            let next = Self::scale(*price, pct).clamp(floor, ceiling);
            if next != *price {
                *price = next;
                moved.push(item.clone());
            }
        }
        self.ledger.last_drift_day = day;
        moved
    }

    fn announce_prices<'i>(
        &self,
        items: impl IntoIterator<Item = &'i String>,
        ctx: &mut SystemContext<'_>,
    ) {
        for item in items {
            if let Some(price) = self.quote(item) {
                ctx.emit(GameEvent::MarketPriceChanged {
                    item: item.clone(),
                    price,
                });
            }
        }
    }

    fn mirror(&self, world: &mut WorldContext) {
        world.economy.gold = self.ledger.gold;
    }

    fn node(state: &str) -> String {
        node_name(SYSTEM, state)
    }

    fn trade_params(input: &TransitionInput) -> Result<(String, u32), PluginError> {
        let item = input
            .text("item")
            .ok_or_else(|| PluginError::MissingField {
                field: "item".to_owned(),
            })?
            .to_owned();
        let quantity = input
            .int("quantity")
            .map_or(Some(1), |value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
            .ok_or_else(|| PluginError::InvalidField {
                field: "quantity".to_owned(),
                reason: "quantity must be a positive whole number".to_owned(),
            })?;
        Ok((item, quantity))
    }

    fn require_market(ctx: &SystemContext<'_>) -> Result<(), PluginError> {
        if ctx.controller.current_node_name(SYSTEM) == Some(Self::node(MARKET).as_str()) {
            Ok(())
        } else {
            Err(PluginError::rejected("the market is not open"))
        }
    }

    fn status(&self) -> &'static str {
        if self.ledger.at_market { MARKET } else { IDLE }
    }

    /// Feed `input` to the automaton and remember where it left the player.
    fn advance(
        &mut self,
        input: &TransitionInput,
        ctx: &mut SystemContext<'_>,
    ) -> Result<TransitionOutcome, PluginError> {
        let outcome = ctx.process_input(SYSTEM, input)?;
        self.ledger.at_market =
            ctx.controller.current_node_name(SYSTEM) == Some(Self::node(MARKET).as_str());
        Ok(outcome)
    }
}

impl SystemPlugin for EconomySystem {
    fn name(&self) -> &str {
        SYSTEM
    }

    fn description(&self) -> &str {
        "Player gold, market prices, and trade"
    }

    fn initialize(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let idle = ctx.controller.create_node(Self::node(IDLE))?;
        let market = ctx.controller.create_node(Self::node(MARKET))?;

        let c = &mut *ctx.controller;
        c.add_transition(idle, |i| i.is("open_market"), market, "visit the market")?;
        c.add_transition(market, |i| i.is("leave"), idle, "leave the market")?;
        c.add_transition(market, |i| i.is("buy") || i.is("sell"), market, "trade")?;

        if let Some(node) = c.node_mut(idle) {
            node.add_action(Action::fixed(
                "open_market",
                "Visit the market",
                TransitionInput::new("open_market"),
            ));
        }
        if let Some(node) = c.node_mut(market) {
            node.add_action(Action::fixed(
                "leave",
                "Leave the market",
                TransitionInput::new("leave"),
            ));
            for item in self.ledger.prices.keys() {
                let input = TransitionInput::new("buy").with("item", item.as_str());
                node.add_action(Action::fixed(
                    format!("buy_{item}"),
                    format!("Buy {item}"),
                    input,
                ));
            }
        }
        c.set_system_root(SYSTEM, idle)?;
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
            "buy" => {
                Self::require_market(ctx)?;
                let (item, quantity) = Self::trade_params(input)?;
                let cost = self.buy(&item, quantity)?;
                info!(item = %item, quantity, cost, "bought");
                ctx.emit(GameEvent::TransactionCompleted {
                    item,
                    gold_delta: cost.saturating_neg(),
                });
                self.advance(input, ctx)
            }
            "sell" => {
                Self::require_market(ctx)?;
                let (item, quantity) = Self::trade_params(input)?;
                let proceeds = self.sell(&item, quantity)?;
                info!(item = %item, quantity, proceeds, "sold");
                ctx.emit(GameEvent::TransactionCompleted {
                    item,
                    gold_delta: proceeds,
                });
                self.advance(input, ctx)
            }
            _ => self.advance(input, ctx),
        }
    }

    fn save_state(&self) -> Value {
        serde_json::to_value(&self.ledger).unwrap_or_else(|err| {
            error!(error = %err, "failed to encode ledger");
            Value::Null
        })
    }

    fn load_state(&mut self, state: &Value, ctx: &mut SystemContext<'_>) -> Result<(), PluginError> {
        let mut ledger: Ledger = decode_state(state)?;
        if ledger.gold < 0 {
            return Err(PluginError::InvalidField {
                field: "gold".to_owned(),
                reason: format!("gold cannot be negative, got {}", ledger.gold),
            });
        }
        if let Some((item, price)) = ledger.prices.iter().find(|(_, price)| **price <= 0) {
            return Err(PluginError::InvalidField {
                field: "prices".to_owned(),
                reason: format!("{item} has non-positive price {price}"),
            });
        }
        // Items added to the config since the save keep their base price.
        for (item, price) in &self.config.base_prices {
            ledger.prices.entry(item.clone()).or_insert(*price);
        }
        let previous = std::mem::replace(&mut self.ledger, ledger);
        if let Err(err) = ctx.controller.restore_current(SYSTEM, &Self::node(self.status())) {
            self.ledger = previous;
            return Err(err.into());
        }
        self.mirror(ctx.world);
        Ok(())
    }

    fn handle_event(&mut self, event: &GameEvent, ctx: &mut SystemContext<'_>) -> bool {
        match event {
            GameEvent::TransactionCompleted { item, gold_delta } => {
                let gold = self.apply_transaction(*gold_delta);
                debug!(item = %item, gold_delta, gold, "transaction applied");
                self.mirror(ctx.world);
                true
            }
            GameEvent::DayPassed { day } => {
                if !self.drift_due(*day) {
                    return false;
                }
                let mut rng = SmallRng::seed_from_u64(self.config.seed ^ u64::from(*day));
                let moved = self.drift_prices(*day, &mut rng);
                debug!(day, moved = moved.len(), "market prices drifted");
                self.announce_prices(&moved, ctx);
                true
            }
            GameEvent::WeatherChanged { region, weather } => {
                if region != ctx.world.current_region() {
                    return false;
                }
                let storm = *weather == Weather::Storm;
                if storm == self.ledger.storm_markup {
                    return false;
                }
                self.ledger.storm_markup = storm;
                info!(storm, region = %region, "storm markup changed");
                let items: Vec<String> = self.ledger.prices.keys().cloned().collect();
                self.announce_prices(&items, ctx);
                true
            }
            _ => false,
        }
    }

    fn treasury(&self) -> Option<&dyn Treasury> {
        Some(self)
    }
}

impl Treasury for EconomySystem {
    fn gold(&self) -> i64 {
        self.ledger.gold
    }

    fn price(&self, item: &str) -> Option<i64> {
        self.quote(item)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_core::AutomatonController;

    use super::*;

    fn setup() -> (EconomySystem, AutomatonController, WorldContext) {
        let mut economy = EconomySystem::new(&EconomyConfig::default());
        let mut controller = AutomatonController::new();
        let mut world = WorldContext::new();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        economy.initialize(&mut ctx).unwrap();
        drop(ctx);
        (economy, controller, world)
    }

    fn buy(item: &str, quantity: i64) -> TransitionInput {
        TransitionInput::new("buy")
            .with("item", item)
            .with("quantity", quantity)
    }

    #[test]
    fn transactions_move_gold_without_overdraft() {
        let mut economy = EconomySystem::new(&EconomyConfig::default());
        assert_eq!(economy.apply_transaction(-200), 800);
        assert_eq!(economy.apply_transaction(50), 850);
        assert_eq!(economy.apply_transaction(-5_000), 0);
    }

    #[test]
    fn buying_needs_the_market_and_the_gold() {
        let (mut economy, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(economy.handle_input(&buy("bread", 1), &mut ctx).is_err());

        economy
            .handle_input(&TransitionInput::new("open_market"), &mut ctx)
            .unwrap();
        assert!(economy.handle_input(&buy("sword", 9), &mut ctx).is_err());
        assert!(economy.handle_input(&buy("dragon", 1), &mut ctx).is_err());

        let outcome = economy.handle_input(&buy("potion", 2), &mut ctx).unwrap();
        assert!(outcome.handled);
        assert_eq!(
            ctx.emitted(),
            &[GameEvent::TransactionCompleted {
                item: "potion".into(),
                gold_delta: -100
            }]
        );
        assert_eq!(economy.owned("potion"), 2);
        // The debit lands when the transaction event comes back.
        assert_eq!(economy.gold(), 1000);
        let debit = ctx.emitted().first().cloned().unwrap();
        assert!(economy.handle_event(&debit, &mut ctx));
        drop(ctx);
        assert_eq!(world.economy.gold, 900);
    }

    #[test]
    fn selling_returns_half_price() {
        let mut economy = EconomySystem::new(&EconomyConfig::default());
        economy.buy("sword", 1).unwrap();
        assert!(economy.sell("sword", 2).is_err());
        assert_eq!(economy.sell("sword", 1).unwrap(), 60);
        assert_eq!(economy.owned("sword"), 0);
        assert!(economy.ledger().inventory.is_empty());
    }

    #[test]
    fn storm_in_current_region_marks_prices_up() {
        let (mut economy, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let elsewhere = GameEvent::WeatherChanged {
            region: "harbor".into(),
            weather: Weather::Storm,
        };
        assert!(!economy.handle_event(&elsewhere, &mut ctx));

        let storm = GameEvent::WeatherChanged {
            region: "city".into(),
            weather: Weather::Storm,
        };
        assert!(economy.handle_event(&storm, &mut ctx));
        assert_eq!(economy.price("sword"), Some(144));
        assert_eq!(ctx.emitted().len(), economy.ledger().prices.len());
        // A second storm report changes nothing.
        assert!(!economy.handle_event(&storm, &mut ctx));

        let clear = GameEvent::WeatherChanged {
            region: "city".into(),
            weather: Weather::Clear,
        };
        assert!(economy.handle_event(&clear, &mut ctx));
        assert_eq!(economy.price("sword"), Some(120));
    }

    #[test]
    fn drift_is_bounded_and_reproducible() {
        let config = EconomyConfig {
            max_drift_pct: 50,
            ..EconomyConfig::default()
        };
        let mut first = EconomySystem::new(&config);
        let mut second = EconomySystem::new(&config);
        for day in 1..=40 {
            first.drift_prices(day, &mut SmallRng::seed_from_u64(u64::from(day)));
            second.drift_prices(day, &mut SmallRng::seed_from_u64(u64::from(day)));
        }
        assert_eq!(first.ledger(), second.ledger());
        for (item, price) in &first.ledger().prices {
            let base = config.base_prices.get(item).copied().unwrap();
            let floor = base.checked_div(2).unwrap();
            assert!(
                (floor..=base.saturating_mul(2)).contains(price),
                "{item} at {price}"
            );
        }
        assert_eq!(first.ledger().last_drift_day, 40);
    }

    #[test]
    fn drift_follows_the_interval() {
        let config = EconomyConfig {
            price_drift_interval_days: 3,
            ..EconomyConfig::default()
        };
        let (mut economy, mut controller, mut world) = setup();
        economy.config = config;
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        assert!(!economy.handle_event(&GameEvent::DayPassed { day: 2 }, &mut ctx));
        assert!(economy.handle_event(&GameEvent::DayPassed { day: 3 }, &mut ctx));
        assert!(!economy.handle_event(&GameEvent::DayPassed { day: 4 }, &mut ctx));
    }

    #[test]
    fn load_rejects_bad_ledgers_and_keeps_state() {
        let (mut economy, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        let negative = serde_json::json!({ "gold": -1 });
        assert!(economy.load_state(&negative, &mut ctx).is_err());
        let free = serde_json::json!({ "gold": 5, "prices": { "bread": 0 } });
        assert!(economy.load_state(&free, &mut ctx).is_err());
        assert_eq!(economy.gold(), 1000);

        let saved = serde_json::json!({ "gold": 42, "prices": { "bread": 7 } });
        economy.load_state(&saved, &mut ctx).unwrap();
        drop(ctx);
        assert_eq!(economy.price("bread"), Some(7));
        assert_eq!(economy.price("sword"), Some(120));
        assert_eq!(world.economy.gold, 42);
    }

    #[test]
    fn a_market_visit_survives_save_and_load() {
        let (mut economy, mut controller, mut world) = setup();
        let mut ctx = SystemContext::new(&mut controller, &mut world);
        economy
            .handle_input(&TransitionInput::new("open_market"), &mut ctx)
            .unwrap();
        drop(ctx);
        assert!(economy.ledger().at_market);
        let saved = economy.save_state();

        let (mut restored, mut fresh_controller, mut fresh_world) = setup();
        let mut ctx = SystemContext::new(&mut fresh_controller, &mut fresh_world);
        restored.load_state(&saved, &mut ctx).unwrap();
        assert_eq!(
            ctx.controller.current_node_name(SYSTEM),
            Some("economy.market")
        );
        assert!(restored.handle_input(&buy("bread", 1), &mut ctx).is_ok());

        restored
            .handle_input(&TransitionInput::new("leave"), &mut ctx)
            .unwrap();
        drop(ctx);
        assert!(!restored.ledger().at_market);
    }
}
