use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;
use tracing::debug;

use crate::config::Configuration;
use crate::error::{ErrorKind, SyncResult};
use crate::split::{Splitter, check_advice_number};
use crate::{bail, sync_error};

/// Radix used to map ASCII strings onto integers.
const ASCII_RADIX: u32 = 128;

/// Longest string prefix taken into account when computing intermediate string bounds.
const MAX_STRING_SPLIT_LEN: usize = 32;

/// Splits a key range into contiguous sub-ranges, each expressed as a WHERE fragment.
///
/// Settings are read from the slice configuration:
///
/// - `split_pk`: the key column
/// - `split_range.lower` / `split_range.upper`: inclusive bounds, integers or ASCII strings
/// - `split_range.type`: `number` or `string`, inferred from the bounds when absent
/// - `split_range.include_null`: adds a slice reading the rows whose key is null
/// - `where`: an existing filter, combined with every fragment
///
/// The fragment of each slice is written back to `where`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeSplitter;

/// Kind of values a range is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Number,
    String,
}

/// Sub-range of a split, rendered as SQL by [`KeyRange::to_where_fragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRange {
    /// Both bounds included.
    Inclusive(String, String),
    /// Lower bound included, upper bound excluded.
    HalfOpen(String, String),
    /// Rows whose key is null.
    Null,
}

impl KeyRange {
    pub fn to_where_fragment(&self, column: &str, kind: RangeKind) -> String {
        let literal = |value: &str| match kind {
            RangeKind::Number => value.to_string(),
            RangeKind::String => format!("'{}'", value.replace('\'', "''")),
        };

        match self {
            KeyRange::Inclusive(lower, upper) => format!(
                "{column} >= {} AND {column} <= {}",
                literal(lower),
                literal(upper)
            ),
            KeyRange::HalfOpen(lower, upper) => format!(
                "{column} >= {} AND {column} < {}",
                literal(lower),
                literal(upper)
            ),
            KeyRange::Null => format!("{column} IS NULL"),
        }
    }
}

impl Splitter for RangeSplitter {
    fn split(
        &self,
        config: &Configuration,
        advice_number: usize,
    ) -> SyncResult<Vec<Configuration>> {
        check_advice_number(advice_number)?;

        let column = config.require_string("split_pk")?;
        let lower = bound(config, "split_range.lower")?;
        let upper = bound(config, "split_range.upper")?;
        let kind = match config.get_string("split_range.type").as_deref() {
            Some("number") => RangeKind::Number,
            Some("string") => RangeKind::String,
            Some(other) => bail!(
                ErrorKind::InvalidSplitConfig,
                "Unknown split range type",
                other
            ),
            None if is_integer(&lower) && is_integer(&upper) => RangeKind::Number,
            None => RangeKind::String,
        };

        let mut ranges = match kind {
            RangeKind::Number => split_number_range(&lower, &upper, advice_number)?,
            RangeKind::String => split_string_range(&lower, &upper, advice_number)?,
        };
        if config.get_bool("split_range.include_null").unwrap_or(false) {
            ranges.push(KeyRange::Null);
        }

        let existing_where = config
            .get_string("where")
            .filter(|existing| !existing.trim().is_empty());

        debug!(
            column = %column,
            slices = ranges.len(),
            advice_number,
            "split key range"
        );

        let mut slices = Vec::with_capacity(ranges.len());
        for range in &ranges {
            let fragment = range.to_where_fragment(&column, kind);
            let clause = match &existing_where {
                Some(existing) => format!("({existing}) AND ({fragment})"),
                None => fragment,
            };

            let mut slice = config.clone();
            slice.set("where", clause)?;
            slices.push(slice);
        }

        Ok(slices)
    }
}

fn bound(config: &Configuration, path: &str) -> SyncResult<String> {
    match config.get(path) {
        Some(Value::Number(value)) => Ok(value.to_string()),
        Some(Value::String(value)) => Ok(value.clone()),
        _ => bail!(
            ErrorKind::InvalidSplitConfig,
            "Missing split range bound",
            path
        ),
    }
}

fn is_integer(value: &str) -> bool {
    BigDecimal::from_str(value.trim()).is_ok_and(|parsed| parsed.with_scale(0) == parsed)
}

fn parse_integer(value: &str) -> SyncResult<BigDecimal> {
    BigDecimal::from_str(value.trim())
        .ok()
        .filter(|parsed| parsed.with_scale(0) == *parsed)
        .map(|parsed| parsed.with_scale(0))
        .ok_or_else(|| {
            sync_error!(
                ErrorKind::InvalidSplitConfig,
                "Split range bound is not an integer",
                value
            )
        })
}

/// Splits the inclusive range `[lower, upper]` into at most `advice_number` ranges of equal
/// width, the last range absorbing the remainder. Ranges with fewer values than
/// `advice_number` yield one range per value.
pub fn split_number_range(
    lower: &str,
    upper: &str,
    advice_number: usize,
) -> SyncResult<Vec<KeyRange>> {
    check_advice_number(advice_number)?;

    let lower = parse_integer(lower)?;
    let upper = parse_integer(upper)?;
    if lower > upper {
        bail!(
            ErrorKind::InvalidSplitConfig,
            "Split range lower bound is greater than its upper bound",
            format!("[{lower}, {upper}]")
        );
    }

    let one = BigDecimal::from(1);
    let total = &upper - &lower + &one;
    let advice = BigDecimal::from(advice_number as u64);
    let slices = if total < advice { total.clone() } else { advice };
    let width = (&total / &slices).with_scale(0);
    let slice_count: usize = slices.to_string().parse()?;

    let mut ranges = Vec::with_capacity(slice_count);
    for i in 0..slice_count {
        let start = (&lower + &width * BigDecimal::from(i as u64)).with_scale(0);
        let end = if i + 1 == slice_count {
            upper.clone()
        } else {
            (&start + &width - &one).with_scale(0)
        };

        ranges.push(KeyRange::Inclusive(start.to_string(), end.to_string()));
    }

    Ok(ranges)
}

/// Splits the inclusive range `[lower, upper]` of ASCII strings into at most `advice_number`
/// lexicographically contiguous ranges.
///
/// Strings are read as base 128 numbers, padded to the same length so that the numeric order
/// matches the lexicographic one. The outer bounds are kept verbatim; all ranges but the last
/// exclude their upper bound.
pub fn split_string_range(
    lower: &str,
    upper: &str,
    advice_number: usize,
) -> SyncResult<Vec<KeyRange>> {
    check_advice_number(advice_number)?;

    for value in [lower, upper] {
        if !value.is_ascii() {
            bail!(
                ErrorKind::InvalidSplitConfig,
                "Only ASCII strings can be split into ranges",
                value
            );
        }
    }
    if lower > upper {
        bail!(
            ErrorKind::InvalidSplitConfig,
            "Split range lower bound is greater than its upper bound",
            format!("['{lower}', '{upper}']")
        );
    }

    let width = lower.len().max(upper.len()).min(MAX_STRING_SPLIT_LEN);
    let lower_number = ascii_to_number(lower, width);
    let upper_number = ascii_to_number(upper, width);
    let span = &upper_number - &lower_number;
    let advice = BigDecimal::from(advice_number as u64);

    let mut points = vec![lower.to_string()];
    for i in 1..advice_number {
        let offset = (&span * BigDecimal::from(i as u64) / &advice).with_scale(0);
        let point = number_to_ascii(&(&lower_number + offset), width);

        // Points computed from truncated prefixes can fall outside the verbatim bounds.
        let last = points.last().map(String::as_str).unwrap_or(lower);
        if point.as_str() > last && point.as_str() < upper {
            points.push(point);
        }
    }

    let mut ranges = Vec::with_capacity(points.len());
    for (i, start) in points.iter().enumerate() {
        match points.get(i + 1) {
            Some(end) => ranges.push(KeyRange::HalfOpen(start.clone(), end.clone())),
            None => ranges.push(KeyRange::Inclusive(start.clone(), upper.to_string())),
        }
    }

    Ok(ranges)
}

fn ascii_to_number(value: &str, width: usize) -> BigDecimal {
    let radix = BigDecimal::from(ASCII_RADIX);
    let mut digits = value.bytes().take(width).collect::<Vec<_>>();
    digits.resize(width, 0);

    digits.into_iter().fold(BigDecimal::from(0), |number, digit| {
        number * &radix + BigDecimal::from(u32::from(digit))
    })
}

fn number_to_ascii(number: &BigDecimal, width: usize) -> String {
    let radix = BigDecimal::from(ASCII_RADIX);
    let mut remaining = number.with_scale(0);
    let mut bytes = vec![0u8; width];

    for slot in bytes.iter_mut().rev() {
        let quotient = (&remaining / &radix).with_scale(0);
        let digit = (&remaining - &quotient * &radix).with_scale(0);
        *slot = digit.to_string().parse::<u8>().unwrap_or(0);
        remaining = quotient;
    }

    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    bytes.into_iter().map(char::from).collect()
}
