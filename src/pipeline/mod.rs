use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{Config, EndpointsConfig},
    error::{RelayError, map_http_status},
    payment::{
        receipt::{PaymentReceipt, extract_payment_info},
        transport::PaymentTransport,
        types::{ApiRequest, ApiResponse, PaymentMode, PaymentProfile},
    },
};

pub mod flows;
pub mod insight;
pub mod news;
pub mod progress;
pub mod search;

use flows::FlowSnapshot;
use news::NewsSummaries;
use progress::{PipelineEvent, ProgressSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    News,
    Flows,
    Search,
    Insight,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::News, Stage::Flows, Stage::Search, Stage::Insight];

    pub fn number(self) -> usize {
        match self {
            Stage::News => 1,
            Stage::Flows => 2,
            Stage::Search => 3,
            Stage::Insight => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::News => "Gloria AI news",
            Stage::Flows => "Nansen smart money netflow",
            Stage::Search => "Heurist AI search",
            Stage::Insight => "LLM chat analysis",
        }
    }

    pub fn provider(self) -> &'static str {
        match self {
            Stage::News => "Gloria AI",
            Stage::Flows => "Nansen",
            Stage::Search => "Heurist",
            Stage::Insight => "LLM Chat",
        }
    }

    pub fn activity(self) -> &'static str {
        match self {
            Stage::News => "Fetching Gloria AI news",
            Stage::Flows => "Fetching Nansen smart money data",
            Stage::Search => "Searching crypto news with Heurist AI",
            Stage::Insight => "Generating investment analysis with LLM",
        }
    }

    pub fn completes(self) -> PipelineState {
        match self {
            Stage::News => PipelineState::NewsFetched,
            Stage::Flows => PipelineState::FlowsFetched,
            Stage::Search => PipelineState::SearchDone,
            Stage::Insight => PipelineState::InsightGenerated,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    NewsFetched,
    FlowsFetched,
    SearchDone,
    InsightGenerated,
    Reported,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    /// Last state reached before the failure.
    pub reached: PipelineState,
    pub error: RelayError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}) failed", self.stage.number(), self.stage)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub news: NewsSummaries,
    pub flows: FlowSnapshot,
    pub search: Value,
    pub analysis: String,
    pub receipts: Vec<(Stage, PaymentReceipt)>,
    pub state: PipelineState,
}

pub struct Pipeline {
    transport: Arc<dyn PaymentTransport>,
    progress: Arc<dyn ProgressSink>,
    endpoints: EndpointsConfig,
    relay_profile: PaymentProfile,
    direct_profile: PaymentProfile,
    temperature: f64,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn PaymentTransport>,
        progress: Arc<dyn ProgressSink>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            progress,
            endpoints: config.endpoints.clone(),
            relay_profile: config.payment.profile(PaymentMode::Relay),
            direct_profile: config.payment.profile(PaymentMode::Direct),
            temperature: config.insight.temperature,
        }
    }

    pub async fn run(&self) -> Result<PipelineReport, StageFailure> {
        let mut run = RunState::default();

        let news = self.fetch_news(&mut run).await?;
        let flows = self.fetch_flows(&mut run).await?;
        let search = self.search(&mut run, &flows).await?;
        let analysis = self.generate_insight(&mut run, &news, &flows, &search).await?;

        self.progress.on_event(PipelineEvent::Completed {
            analysis: analysis.clone(),
            receipts: run.receipts.clone(),
        });
        run.advance(PipelineState::Reported);

        Ok(PipelineReport {
            news,
            flows,
            search,
            analysis,
            receipts: run.receipts,
            state: run.state,
        })
    }

    async fn fetch_news(&self, run: &mut RunState) -> Result<NewsSummaries, StageFailure> {
        let stage = Stage::News;
        let body = self
            .exchange(run, stage, &self.relay_profile, news::news_request(&self.endpoints.news_url))
            .await?;
        let summaries = news::parse_news(&body).map_err(|err| run.fail(stage, err))?;

        self.progress.on_event(PipelineEvent::NewsReceived {
            items: body.as_array().map(Vec::len).unwrap_or_default(),
        });
        run.advance(stage.completes());
        Ok(summaries)
    }

    async fn fetch_flows(&self, run: &mut RunState) -> Result<FlowSnapshot, StageFailure> {
        let stage = Stage::Flows;
        let body = self
            .exchange(
                run,
                stage,
                &self.relay_profile,
                flows::flows_request(&self.endpoints.flows_url),
            )
            .await?;
        let snapshot = flows::parse_flows(body).map_err(|err| run.fail(stage, err))?;

        self.progress.on_event(PipelineEvent::FlowsReceived {
            rows: snapshot.rows.clone(),
        });
        run.advance(stage.completes());
        Ok(snapshot)
    }

    async fn search(
        &self,
        run: &mut RunState,
        flows: &FlowSnapshot,
    ) -> Result<Value, StageFailure> {
        let stage = Stage::Search;
        self.progress.on_event(PipelineEvent::StageStarted { stage });

        let term = search::build_search_term(&flows.symbols, &flows.sectors);
        self.progress.on_event(PipelineEvent::SearchTermBuilt { term: term.clone() });

        let body = self
            .send_checked(
                run,
                stage,
                &self.relay_profile,
                search::search_request(&self.endpoints.search_url, &term),
            )
            .await?;
        let payload = search::extract_search_payload(&body);

        self.progress.on_event(PipelineEvent::SearchCompleted);
        run.advance(stage.completes());
        Ok(payload)
    }

    async fn generate_insight(
        &self,
        run: &mut RunState,
        news: &NewsSummaries,
        flows: &FlowSnapshot,
        search: &Value,
    ) -> Result<String, StageFailure> {
        let stage = Stage::Insight;
        self.progress.on_event(PipelineEvent::StageStarted { stage });

        let messages = insight::build_messages(news, &flows.records, search)
            .map_err(|err| run.fail(stage, err))?;
        let body = self
            .send_checked(
                run,
                stage,
                &self.direct_profile,
                insight::chat_request(&self.endpoints.chat_url, &messages, self.temperature),
            )
            .await?;
        let analysis = insight::extract_response_text(&body);

        self.progress.on_event(PipelineEvent::InsightGenerated);
        run.advance(stage.completes());
        Ok(analysis)
    }

    async fn exchange(
        &self,
        run: &mut RunState,
        stage: Stage,
        profile: &PaymentProfile,
        request: ApiRequest,
    ) -> Result<Value, StageFailure> {
        self.progress.on_event(PipelineEvent::StageStarted { stage });
        self.send_checked(run, stage, profile, request).await
    }

    async fn send_checked(
        &self,
        run: &mut RunState,
        stage: Stage,
        profile: &PaymentProfile,
        request: ApiRequest,
    ) -> Result<Value, StageFailure> {
        let url = request.url.clone();
        let response = self
            .transport
            .send(profile, request)
            .await
            .map_err(|err| run.fail(stage, err))?;
        ensure_success(&url, &response).map_err(|err| run.fail(stage, err))?;

        let receipt = extract_payment_info(&response.headers);
        if !receipt.is_empty() {
            self.progress.on_event(PipelineEvent::PaymentObserved {
                stage,
                receipt: receipt.clone(),
            });
        }
        run.receipts.push((stage, receipt));

        response.json().map_err(|err| run.fail(stage, err.with_url(url)))
    }
}

pub fn ensure_success(url: &str, response: &ApiResponse) -> Result<(), RelayError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(map_http_status(response.status, url, &response.body))
    }
}

struct RunState {
    state: PipelineState,
    receipts: Vec<(Stage, PaymentReceipt)>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            state: PipelineState::Start,
            receipts: Vec::new(),
        }
    }
}

impl RunState {
    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(
            target: "pipeline",
            from = ?self.state,
            to = ?next,
            "pipeline_state_changed"
        );
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, error: RelayError) -> StageFailure {
        tracing::info!(
            target: "pipeline",
            stage = ?stage,
            reached = ?self.state,
            kind = ?error.kind,
            error = %error,
            "pipeline_stage_failed"
        );
        let reached = self.state;
        self.state = PipelineState::Failed;
        StageFailure {
            stage,
            reached,
            error,
        }
    }
}
