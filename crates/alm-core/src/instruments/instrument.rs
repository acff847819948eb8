use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assumptions::AttributeValue;
use crate::buckets::BucketSet;
use crate::error::AlmError;
use crate::types::{Currency, Money, Rate, Side};
use crate::AlmResult;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Loan,
    Deposit,
    CurrentAccount,
    Bond,
    Interbank,
    Repo,
    CreditLine,
    #[default]
    Other,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Loan => "loan",
            InstrumentKind::Deposit => "deposit",
            InstrumentKind::CurrentAccount => "current_account",
            InstrumentKind::Bond => "bond",
            InstrumentKind::Interbank => "interbank",
            InstrumentKind::Repo => "repo",
            InstrumentKind::CreditLine => "credit_line",
            InstrumentKind::Other => "other",
        }
    }
}

/// Accounting book. Interest-rate risk is normally measured on the banking
/// book only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookType {
    #[default]
    Banking,
    Trading,
}

impl BookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookType::Banking => "banking",
            BookType::Trading => "trading",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    #[default]
    Fixed,
    Floating,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Fixed => "fixed",
            RateType::Floating => "floating",
        }
    }
}

// ---------------------------------------------------------------------------
// Instrument record
// ---------------------------------------------------------------------------

/// A contractual principal payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub date: NaiveDate,
    pub amount: Money,
}

/// A balance-sheet position. `balance` is always non-negative; `side`
/// decides whether its flows are inflows or outflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub kind: InstrumentKind,
    pub side: Side,
    pub balance: Money,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub repricing_date: Option<NaiveDate>,
    #[serde(default)]
    pub interest_rate: Rate,
    #[serde(default)]
    pub rate_type: RateType,
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default)]
    pub counterparty_type: Option<String>,
    #[serde(default)]
    pub instrument_class: Option<String>,
    #[serde(default)]
    pub instrument_subclass: Option<String>,
    #[serde(default)]
    pub book: BookType,
    /// Non-maturity (on-demand) balance.
    #[serde(default)]
    pub is_demand: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repayment_schedule: Vec<ScheduledPayment>,
    #[serde(default)]
    pub coupon_rate: Option<Rate>,
    #[serde(default)]
    pub coupon_frequency_days: Option<i64>,
    /// Unused commitment on credit lines.
    #[serde(default)]
    pub undrawn_amount: Money,
    #[serde(default)]
    pub early_withdrawal_allowed: bool,
}

impl Instrument {
    pub fn new(id: &str, kind: InstrumentKind, side: Side, balance: Money, currency: Currency) -> Self {
        Instrument {
            id: id.to_string(),
            kind,
            side,
            balance,
            currency,
            maturity_date: None,
            repricing_date: None,
            interest_rate: Decimal::ZERO,
            rate_type: RateType::Fixed,
            counterparty_name: None,
            counterparty_type: None,
            instrument_class: None,
            instrument_subclass: None,
            book: BookType::Banking,
            is_demand: false,
            repayment_schedule: Vec::new(),
            coupon_rate: None,
            coupon_frequency_days: None,
            undrawn_amount: Decimal::ZERO,
            early_withdrawal_allowed: false,
        }
    }

    pub fn with_maturity(mut self, date: NaiveDate) -> Self {
        self.maturity_date = Some(date);
        self
    }

    pub fn with_rate(mut self, rate: Rate) -> Self {
        self.interest_rate = rate;
        self
    }

    pub fn with_counterparty(mut self, name: Option<&str>, cp_type: &str) -> Self {
        self.counterparty_name = name.map(str::to_string);
        self.counterparty_type = Some(cp_type.to_string());
        self
    }

    pub fn demand(mut self) -> Self {
        self.is_demand = true;
        self
    }

    pub fn days_to_maturity(&self, calc_date: NaiveDate) -> Option<i64> {
        self.maturity_date.map(|m| (m - calc_date).num_days())
    }

    /// On-demand balances whose timing comes from behavioral assumptions
    /// rather than a contractual date.
    pub fn is_non_maturity(&self) -> bool {
        self.is_demand
            || self.kind == InstrumentKind::CurrentAccount
            || (self.side == Side::Liability && self.maturity_date.is_none())
    }

    /// Customer funding whose volume reacts to rate changes.
    pub fn is_deposit_like(&self) -> bool {
        self.side == Side::Liability
            && matches!(self.kind, InstrumentKind::Deposit | InstrumentKind::CurrentAccount)
    }

    pub fn attributes(&self, calc_date: NaiveDate, buckets: &BucketSet) -> InstrumentAttributes {
        let maturity_days = self.days_to_maturity(calc_date);
        let maturity_bucket = maturity_days
            .and_then(|d| buckets.assign(d))
            .map(|idx| buckets.label(idx).to_string());
        InstrumentAttributes {
            instrument_id: self.id.clone(),
            counterparty_name: self.counterparty_name.clone(),
            counterparty_type: self.counterparty_type.clone(),
            instrument_class: self.instrument_class.clone(),
            instrument_subclass: self.instrument_subclass.clone(),
            currency: self.currency.clone(),
            kind: self.kind,
            side: self.side,
            book: self.book,
            rate_type: self.rate_type,
            amount: self.balance,
            maturity_days,
            maturity_bucket,
            is_demand: self.is_non_maturity(),
        }
    }

    pub fn validate(&self, idx: usize) -> AlmResult<()> {
        let field = |name: &str| format!("instruments[{idx}].{name}");
        if self.id.trim().is_empty() {
            return Err(AlmError::invalid(field("id"), "Instrument id must not be empty"));
        }
        if self.balance < Decimal::ZERO {
            return Err(AlmError::invalid(
                field("balance"),
                format!("Balance of '{}' must be non-negative; use side for direction", self.id),
            ));
        }
        if self.undrawn_amount < Decimal::ZERO {
            return Err(AlmError::invalid(field("undrawn_amount"), "Must be non-negative"));
        }
        if let Some(freq) = self.coupon_frequency_days {
            if freq <= 0 {
                return Err(AlmError::invalid(
                    field("coupon_frequency_days"),
                    "Coupon frequency must be positive",
                ));
            }
        }
        if self.repayment_schedule.iter().any(|p| p.amount < Decimal::ZERO) {
            return Err(AlmError::invalid(
                field("repayment_schedule"),
                "Scheduled payments must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Validate every instrument and reject duplicate ids.
pub fn validate_instruments(instruments: &[Instrument]) -> AlmResult<()> {
    let mut seen = std::collections::HashSet::with_capacity(instruments.len());
    for (i, inst) in instruments.iter().enumerate() {
        inst.validate(i)?;
        if !seen.insert(inst.id.as_str()) {
            return Err(AlmError::invalid(
                format!("instruments[{i}].id"),
                format!("Duplicate instrument id '{}'", inst.id),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Attributes for rule matching
// ---------------------------------------------------------------------------

/// Flat view of an instrument as seen by assumption rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentAttributes {
    pub instrument_id: String,
    pub counterparty_name: Option<String>,
    pub counterparty_type: Option<String>,
    pub instrument_class: Option<String>,
    pub instrument_subclass: Option<String>,
    pub currency: Currency,
    pub kind: InstrumentKind,
    pub side: Side,
    pub book: BookType,
    pub rate_type: RateType,
    pub amount: Money,
    pub maturity_days: Option<i64>,
    pub maturity_bucket: Option<String>,
    pub is_demand: bool,
}

impl InstrumentAttributes {
    /// Attribute names a rule condition may reference.
    pub const FIELDS: &'static [&'static str] = &[
        "instrument_id",
        "counterparty_name",
        "counterparty_type",
        "instrument_class",
        "instrument_subclass",
        "currency",
        "kind",
        "side",
        "book",
        "rate_type",
        "amount",
        "maturity_days",
        "maturity_bucket",
        "is_demand",
    ];

    pub fn get(&self, field: &str) -> Option<AttributeValue> {
        let text = |s: &str| Some(AttributeValue::text(s));
        match field {
            "instrument_id" => text(&self.instrument_id),
            "counterparty_name" => self.counterparty_name.as_deref().and_then(text),
            "counterparty_type" => self.counterparty_type.as_deref().and_then(text),
            // Unclassified instruments fall back to their kind.
            "instrument_class" => text(self.instrument_class.as_deref().unwrap_or(self.kind.as_str())),
            "instrument_subclass" => self.instrument_subclass.as_deref().and_then(text),
            "currency" => text(self.currency.code()),
            "kind" => text(self.kind.as_str()),
            "side" => text(self.side.as_str()),
            "book" => text(self.book.as_str()),
            "rate_type" => text(self.rate_type.as_str()),
            "amount" => Some(AttributeValue::Number(self.amount)),
            "maturity_days" => self.maturity_days.map(|d| AttributeValue::Number(Decimal::from(d))),
            "maturity_bucket" => self.maturity_bucket.as_deref().and_then(text),
            "is_demand" => Some(AttributeValue::Bool(self.is_demand)),
            _ => None,
        }
    }
}
