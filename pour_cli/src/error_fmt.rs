//! Human-readable error descriptions and structured JSON error formatting.

use pour_core::error::{AbortReason, PourError};

pub fn abort_reason_name(r: &AbortReason) -> &'static str {
    match r {
        AbortReason::Stopped => "Stopped",
        AbortReason::Transport(_) => "Transport",
        AbortReason::Underfill { .. } => "Underfill",
        AbortReason::ReadFailures(_) => "ReadFailures",
    }
}

fn error_name(e: &PourError) -> &'static str {
    match e {
        PourError::Transport(_) => "Transport",
        PourError::Timeout => "Timeout",
        PourError::Config(_) => "Config",
        PourError::NoPump { .. } => "NoPump",
        PourError::UnknownRecipe(_) => "UnknownRecipe",
        PourError::InvalidRecipe(_) => "InvalidRecipe",
        PourError::AlreadyServing => "AlreadyServing",
        PourError::NotServing => "NotServing",
        PourError::PumpsActive(_) => "PumpsActive",
        PourError::TareFailed(_) => "TareFailed",
        PourError::InvalidPump(_) => "InvalidPump",
        PourError::Abort { reason, .. } => abort_reason_name(reason),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(pe) = err.downcast_ref::<PourError>() {
        return match pe {
            PourError::Timeout => "What happened: A bus transaction timed out.\nLikely causes: Another process holds the I2C adapter, or a device is wedged.\nHow to fix: Check the wiring and power, or raise bus.op_timeout_ms in the config.".to_string(),
            PourError::NoPump { ingredient } => format!(
                "What happened: No pump is mapped to {ingredient}.\nLikely causes: The ingredient is missing from [pumps] or the pump CSV.\nHow to fix: Add `{ingredient} = <slot>` under [pumps], then pour again."
            ),
            PourError::UnknownRecipe(id) => format!(
                "What happened: There is no recipe called {id}.\nLikely causes: Typo in the recipe id, or the wrong config file.\nHow to fix: Run `pour recipes` to list the configured ids."
            ),
            PourError::AlreadyServing => "What happened: A pour is already running.\nLikely causes: A previous serve has not finished.\nHow to fix: Wait for it, or run `pour stop`.".to_string(),
            PourError::PumpsActive(pumps) => {
                let list: Vec<String> = pumps.iter().map(u8::to_string).collect();
                format!(
                    "What happened: Pumps {} are running from a manual command.\nLikely causes: A start-pump or timed pump run is still active.\nHow to fix: Run `pour stop` (or stop-pump), then serve again.",
                    list.join(",")
                )
            }
            PourError::InvalidPump(p) => format!(
                "What happened: Pump {p} does not exist.\nLikely causes: Slot numbers run 1..=8.\nHow to fix: Pick a slot between 1 and 8."
            ),
            PourError::TareFailed(msg) => format!(
                "What happened: The scale did not accept the tare command ({msg}).\nLikely causes: Scale not powered or not on the bus.\nHow to fix: Run `pour status` and check the scale link."
            ),
            PourError::Abort { ingredient, reason } => {
                let at = ingredient
                    .as_deref()
                    .map(|i| format!(" while pouring {i}"))
                    .unwrap_or_default();
                match reason {
                    AbortReason::Stopped => format!(
                        "What happened: The pour was stopped{at}.\nLikely causes: Stop requested by the operator.\nHow to fix: Start a new pour when ready."
                    ),
                    AbortReason::Transport(msg) => format!(
                        "What happened: Lost contact with a device{at} ({msg}).\nLikely causes: Loose I2C cable, brown-out, or bus contention.\nHow to fix: Check wiring and power; all pumps were switched off."
                    ),
                    AbortReason::Underfill { measured_g, target_g } => format!(
                        "What happened: Only {measured_g:.1} g of {target_g:.1} g arrived{at}.\nLikely causes: Empty bottle, kinked tube, or a dead pump.\nHow to fix: Refill or check the line, or raise pour.max_ingredient_ms."
                    ),
                    AbortReason::ReadFailures(n) => format!(
                        "What happened: The scale failed {n} reads in a row{at}.\nLikely causes: Scale unplugged or the bus is noisy.\nHow to fix: Run `pour status`; raise pour.max_read_failures if the link is flaky."
                    ),
                }
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("pump map csv must have headers") {
        return "Invalid headers in pump map CSV. Expected 'ingredient,pump'.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: Could not load the configuration ({msg}).\nLikely causes: Wrong --config path or a TOML syntax error.\nHow to fix: Check the path and the file contents, then rerun."
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values or duplicated entries.\nHow to fix: Edit the TOML config and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for pour outcomes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<PourError>() {
        Some(PourError::Abort { reason, .. }) => match reason {
            AbortReason::Stopped => 2,
            AbortReason::Transport(_) => 3,
            AbortReason::Underfill { .. } => 4,
            AbortReason::ReadFailures(_) => 5,
        },
        Some(PourError::NoPump { .. }) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let Some(pe) = err.downcast_ref::<PourError>() else {
        return json!({ "reason": "Error", "message": msg }).to_string();
    };
    let details = match pe {
        PourError::Abort {
            reason: AbortReason::Underfill { measured_g, target_g },
            ..
        } => Some(json!({ "measured_g": measured_g, "target_g": target_g })),
        PourError::Abort {
            reason: AbortReason::ReadFailures(n),
            ..
        } => Some(json!({ "failures": n })),
        _ => None,
    };
    let mut obj = json!({
        "reason": error_name(pe),
        "ingredient": pe.ingredient(),
        "message": msg,
    });
    if let Some(d) = details {
        obj["details"] = d;
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(e: PourError) -> eyre::Report {
        eyre::Report::new(e)
    }

    #[test]
    fn abort_reasons_map_to_distinct_exit_codes() {
        let codes: Vec<i32> = [
            AbortReason::Stopped,
            AbortReason::Transport("nack".into()),
            AbortReason::Underfill {
                measured_g: 3.0,
                target_g: 20.0,
            },
            AbortReason::ReadFailures(3),
        ]
        .into_iter()
        .map(|reason| {
            exit_code_for_error(&report(PourError::Abort {
                ingredient: Some("vodka".into()),
                reason,
            }))
        })
        .collect();
        assert_eq!(codes, vec![2, 3, 4, 5]);
        assert_eq!(
            exit_code_for_error(&report(PourError::NoPump {
                ingredient: "gin".into()
            })),
            6
        );
        assert_eq!(exit_code_for_error(&report(PourError::Timeout)), 1);
    }

    #[test]
    fn underfill_json_carries_amounts() {
        let err = report(PourError::Abort {
            ingredient: Some("lime_juice".into()),
            reason: AbortReason::Underfill {
                measured_g: 4.0,
                target_g: 15.0,
            },
        });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Underfill");
        assert_eq!(v["ingredient"], "lime_juice");
        assert_eq!(v["details"]["target_g"], 15.0);
        assert!(v["message"].as_str().unwrap().contains("4.0 g of 15.0 g"));
    }

    #[test]
    fn unknown_recipe_hint_points_at_listing() {
        let msg = humanize(&report(PourError::UnknownRecipe("zombie".into())));
        assert!(msg.contains("zombie"));
        assert!(msg.contains("pour recipes"));
    }

    #[test]
    fn plain_reports_fall_back_to_generic_json() {
        let err = eyre::eyre!("something odd");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
    }
}
