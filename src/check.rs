//! The comparator library.
//!
//! Every comparator is a pure function from `(actual, expect)` to a verdict.
//! Most functions here generate a comparator from the options you specify;
//! test nodes default to [`equals`]. Comparators answer `Result<bool, Fault>`
//! so a user-supplied check can fail abnormally; the engine reports that as a
//! `check() failed` harness error rather than a plain mismatch.

use crate::fault::Fault;
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A comparison strategy: does `actual` match `expect`?
pub type Check = Arc<dyn Fn(&Value, &Value) -> Result<bool, Fault> + Send + Sync>;

/// Options compiled into a comparator when a test declares its `check` as an
/// options object instead of a function.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CheckOptions {
    /// Skip the strict type-tag match before comparing.
    pub loose_types: bool,
    /// Recurse into lists and maps.
    pub deep: bool,
    /// Expected-side omissions always match.
    pub subset: bool,
    /// Numeric tolerance; only meaningful for numbers.
    pub epsilon: f64,
}

/// Options for [`shallow_equals`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShallowOptions {
    pub loose_types: bool,
    pub subset: bool,
    pub epsilon: f64,
}

impl From<CheckOptions> for ShallowOptions {
    fn from(o: CheckOptions) -> Self {
        ShallowOptions {
            loose_types: o.loose_types,
            subset: o.subset,
            epsilon: o.epsilon,
        }
    }
}

/// Combine multiple checks, requiring a test to pass all of them to pass.
pub fn and<I: IntoIterator<Item = Check>>(checks: I) -> Check {
    let checks: Vec<Check> = checks.into_iter().collect();
    Arc::new(move |actual, expect| {
        for check in &checks {
            if !check(actual, expect)? {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

/// Combine multiple checks, requiring a test to pass any of them to pass.
pub fn or<I: IntoIterator<Item = Check>>(checks: I) -> Check {
    let checks: Vec<Check> = checks.into_iter().collect();
    Arc::new(move |actual, expect| {
        for check in &checks {
            if check(actual, expect)? {
                return Ok(true);
            }
        }
        Ok(false)
    })
}

/// Check the actual value's type, case-insensitively.
pub fn is(type_name: &str) -> Check {
    let wanted = type_name.to_ascii_lowercase();
    Arc::new(move |actual, _expect| Ok(actual.type_name().to_ascii_lowercase() == wanted))
}

/// The atomic comparison. Rules, in order: identical values pass; a Nil
/// expectation requires a Nil actual exactly; type tags must match unless
/// `loose_types`; for numbers a NaN expectation requires a NaN actual and a
/// positive epsilon bounds the absolute difference; otherwise loose equality
/// is the fallback when `loose_types` is set.
pub fn shallow_equals(options: ShallowOptions) -> Check {
    Arc::new(move |actual, expect| Ok(shallow_eq(actual, expect, &options)))
}

fn shallow_eq(actual: &Value, expect: &Value, o: &ShallowOptions) -> bool {
    if let Value::Nil = expect {
        return actual.is_nil();
    }

    if let (Value::Number(a), Value::Number(e)) = (actual, expect) {
        if e.is_nan() {
            return a.is_nan();
        }
        if o.epsilon > 0.0 {
            return (a - e).abs() <= o.epsilon;
        }
        return a == e;
    }

    if !o.loose_types && actual.type_name() != expect.type_name() {
        return false;
    }

    if actual == expect {
        return true;
    }

    if o.loose_types {
        if let (Some(a), Some(e)) = (actual.loose_number(), expect.loose_number()) {
            return a == e;
        }
    }

    false
}

/// Apply a checking function recursively to lists and maps.
///
/// The given check is tried first at every position; containers then recurse.
/// Lists must match in length exactly, and maps are compared over the union
/// of both sides' keys, so a key present on one side only is a mismatch. For
/// the tolerant variants use [`subset`].
pub fn deep(check: Check) -> Check {
    fn go(check: &Check, actual: &Value, expect: &Value) -> Result<bool, Fault> {
        if check(actual, expect)? {
            return Ok(true);
        }

        match expect {
            Value::List(exp) => match actual {
                Value::List(act) => {
                    if act.len() != exp.len() {
                        return Ok(false);
                    }
                    for (a, e) in act.iter().zip(exp) {
                        if !go(check, a, e)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            Value::Map(exp) => match actual {
                Value::Map(act) => {
                    let keys: BTreeSet<&String> = exp.keys().chain(act.keys()).collect();
                    for key in keys {
                        match (act.get(key), exp.get(key)) {
                            (Some(a), Some(e)) => {
                                if !go(check, a, e)? {
                                    return Ok(false);
                                }
                            }
                            _ => return Ok(false),
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            // Not a container, and the shallow check already said no.
            _ => Ok(false),
        }
    }

    Arc::new(move |actual, expect| go(&check, actual, expect))
}

fn deep_eq(actual: &Value, expect: &Value, o: &ShallowOptions) -> bool {
    if shallow_eq(actual, expect, o) {
        return true;
    }

    match expect {
        Value::List(exp) => match actual {
            Value::List(act) => {
                let length_ok = if o.subset {
                    act.len() >= exp.len()
                } else {
                    act.len() == exp.len()
                };
                length_ok
                    && exp
                        .iter()
                        .enumerate()
                        .all(|(i, e)| deep_eq(&act[i], e, o))
            }
            _ => false,
        },
        Value::Map(exp) => match actual {
            Value::Map(act) => {
                let keys: BTreeSet<&String> = exp.keys().chain(act.keys()).collect();
                keys.into_iter().all(|key| match (act.get(key), exp.get(key)) {
                    (Some(a), Some(e)) => deep_eq(a, e, o),
                    // The expectation omits this key entirely.
                    (Some(_), None) => o.subset,
                    _ => false,
                })
            }
            _ => false,
        },
        _ => false,
    }
}

/// The default comparator: deep, strict-length, NaN-aware equality.
pub fn equals() -> Check {
    compile(CheckOptions {
        deep: true,
        ..CheckOptions::default()
    })
}

/// Deep comparison where expected-side omissions always match: keys absent
/// from an expected map are satisfied by anything, and an actual list may be
/// longer than the expected one. Not symmetric, by design.
pub fn subset() -> Check {
    compile(CheckOptions {
        deep: true,
        subset: true,
        ..CheckOptions::default()
    })
}

/// Compile a [`CheckOptions`] description into a comparator.
pub fn compile(options: CheckOptions) -> Check {
    let shallow: ShallowOptions = options.into();
    if options.deep {
        Arc::new(move |actual, expect| Ok(deep_eq(actual, expect, &shallow)))
    } else {
        shallow_equals(shallow)
    }
}

/// Options for [`proximity`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProximityOptions {
    pub epsilon: f64,
}

/// Compare numbers or lists of numbers with a margin of error. A NaN
/// expectation only matches a NaN actual; a Nil expectation only matches Nil.
pub fn proximity(options: ProximityOptions) -> Check {
    Arc::new(move |actual, expect| Ok(near(actual, expect, options.epsilon)))
}

fn near(actual: &Value, expect: &Value, epsilon: f64) -> bool {
    match (actual, expect) {
        (_, Value::Nil) => actual.is_nil(),
        (Value::Number(a), Value::Number(e)) => {
            if e.is_nan() {
                a.is_nan()
            } else {
                (a - e).abs() <= epsilon
            }
        }
        (Value::List(act), Value::List(exp)) => {
            act.len() == exp.len() && act.iter().zip(exp).all(|(a, e)| near(a, e, epsilon))
        }
        _ => false,
    }
}

/// Bounds for [`range`]. `from`/`min`/`to`/`max` are aliases resolved as
/// `from`→`lt`, `min`→`lte`, `to`→`gt`, `max`→`gte`; unspecified bounds are
/// vacuously true.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeOptions {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeOptions {
    fn resolved(self) -> (Option<f64>, Option<f64>, Option<f64>, Option<f64>) {
        (
            self.lt.or(self.from),
            self.lte.or(self.min),
            self.gt.or(self.to),
            self.gte.or(self.max),
        )
    }
}

/// Check that a number lies within the given bounds. All specified bounds
/// must hold; the expected value is ignored.
pub fn range(options: RangeOptions) -> Check {
    let (lt, lte, gt, gte) = options.resolved();
    Arc::new(move |actual, _expect| {
        let n = match actual.as_number() {
            Some(n) => n,
            None => return Ok(false),
        };
        Ok(lt.map_or(true, |b| n < b)
            && lte.map_or(true, |b| n <= b)
            && gt.map_or(true, |b| n > b)
            && gte.map_or(true, |b| n >= b))
    })
}

/// Alias of [`range`].
pub fn between(options: RangeOptions) -> Check {
    range(options)
}
