// evaluate.rs — `janus evaluate`: decide one request and print the result.

use janus_policy::{
    Attributes, EvaluationReport, EvaluationRequest, PdpConfig, PolicyDecisionPoint,
};

pub struct EvaluateArgs {
    pub subject: String,
    pub action: String,
    pub resource: Option<String>,
    pub attrs: Attributes,
    pub trace: bool,
    pub json: bool,
}

pub fn execute(config: &PdpConfig, args: EvaluateArgs) -> anyhow::Result<()> {
    let (store, report) = config.load_store();
    if !report.failed_files.is_empty() || !report.skipped.is_empty() {
        tracing::warn!(
            failed = report.failed_files.len(),
            skipped = report.skipped.len(),
            "some policies were not loaded; run `janus policies check` for details"
        );
    }

    let mut request = EvaluationRequest::new(args.subject, args.action).with_attrs(args.attrs);
    if let Some(resource) = args.resource {
        request = request.with_resource(resource);
    }

    let pdp = PolicyDecisionPoint::new(store);
    let result = pdp.evaluate_all(&request);

    if args.json {
        let out = if args.trace {
            serde_json::to_string_pretty(&result)?
        } else {
            serde_json::to_string_pretty(&result.final_decision)?
        };
        println!("{}", out);
        return Ok(());
    }

    if args.trace {
        print_trace(&result);
        println!();
    }

    let decision = &result.final_decision;
    println!(
        "Decision: {} (policy: {})",
        decision.effect.to_string().to_uppercase(),
        decision.matched_policy
    );
    println!("Reason:   {}", decision.reason);
    Ok(())
}

fn print_trace(report: &EvaluationReport) {
    println!(
        "{:<12} {:>8}  {:<32} {:<18} RESULT",
        "LEVEL", "PRIORITY", "POLICY", "EFFECT"
    );
    println!("{}", "-".repeat(86));

    for m in &report.matches {
        let marker = if m.matches { "*" } else { " " };
        println!(
            "{:<12} {:>8}  {:<32} {:<18} {} {}",
            m.level.to_string(),
            m.priority,
            m.policy,
            m.effect.to_string(),
            marker,
            m.result,
        );
    }
}
