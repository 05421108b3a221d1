use crate::{
    payment::receipt::PaymentReceipt,
    pipeline::{
        Stage,
        flows::{FlowRow, format_usd},
        search::preview_term,
    },
};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
    },
    PaymentObserved {
        stage: Stage,
        receipt: PaymentReceipt,
    },
    NewsReceived {
        items: usize,
    },
    FlowsReceived {
        rows: Vec<FlowRow>,
    },
    SearchTermBuilt {
        term: String,
    },
    SearchCompleted,
    InsightGenerated,
    Completed {
        analysis: String,
        receipts: Vec<(Stage, PaymentReceipt)>,
    },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: PipelineEvent);
}

#[derive(Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_event(&self, _event: PipelineEvent) {}
}

#[derive(Default)]
pub struct ConsoleProgressSink;

impl ConsoleProgressSink {
    pub fn print_banner(&self) {
        println!();
        println!("=== Multi-API Orchestration over a Payment Relay ===");
        println!(
            "{}",
            Stage::ALL
                .iter()
                .map(|stage| stage.provider())
                .collect::<Vec<_>>()
                .join(" + ")
        );
        println!();
    }

    fn print_heading(title: &str) {
        println!("{}", "=".repeat(RULE_WIDTH));
        println!("=== {} ===", title);
        println!("{}", "=".repeat(RULE_WIDTH));
    }
}

impl ProgressSink for ConsoleProgressSink {
    fn on_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage } => {
                println!("[Step {}] {}...", stage.number(), stage.activity());
            }
            PipelineEvent::PaymentObserved { receipt, .. } => {
                println!();
                if let Some(client_payment) = &receipt.client_payment {
                    println!("[Payment] Client TX: {}", client_payment);
                }
                if let Some(response) = &receipt.payment_response {
                    let rendered = serde_json::to_string_pretty(response)
                        .unwrap_or_else(|_| response.to_string());
                    println!("[Payment] Settlement TX: {}", rendered);
                }
                println!();
            }
            PipelineEvent::NewsReceived { items } => {
                println!("[News] Received {} news items", items);
                println!();
            }
            PipelineEvent::FlowsReceived { rows } => {
                println!("[Flows] Received {} smart money flows:", rows.len());
                for row in &rows {
                    println!(
                        "  • {}: ${} | {}",
                        row.token_symbol,
                        format_usd(&row.net_flow_30d_usd),
                        row.token_sectors.join(", ")
                    );
                }
                println!();
            }
            PipelineEvent::SearchTermBuilt { term } => {
                println!("[Search] Search term: {}", preview_term(&term));
            }
            PipelineEvent::SearchCompleted => {
                println!("[Search] Search results received");
                println!();
            }
            PipelineEvent::InsightGenerated => {
                println!("[LLM] Investment analysis generated");
                println!();
            }
            PipelineEvent::Completed { analysis, receipts } => {
                Self::print_heading("Analysis Complete");
                println!();
                println!("LLM Investment Analysis:");
                println!("{}", analysis);
                println!();

                Self::print_heading("Payment Summary");
                println!("Total API calls made: {}", Stage::ALL.len());
                for stage in Stage::ALL {
                    let settled = receipts
                        .iter()
                        .find(|(paid_stage, _)| *paid_stage == stage)
                        .and_then(|(_, receipt)| receipt.settlement_transaction());
                    match settled {
                        Some(tx) => {
                            println!("  {}. {} (tx {})", stage.number(), stage.label(), tx)
                        }
                        None => println!("  {}. {}", stage.number(), stage.label()),
                    }
                }
                println!();
            }
        }
    }
}
