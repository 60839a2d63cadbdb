use std::sync::{Arc, PoisonError, RwLock};

use drishti::core_modules::aggregator::{ALERT_THRESHOLD, ThreatStatus};
use drishti::core_modules::alert_log::{Alert, Severity};
use drishti::core_modules::sample_buffer::Observation;
use drishti::core_modules::sink::PresentationSink;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsView {
    pub threat_level: u32,
    pub incidents: u64,
    pub weapons: u64,
    pub people: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub status: ThreatStatus,
    pub label: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEntry {
    pub time: String,
    pub severity: Severity,
    pub level: String,
    pub message: String,
    /// Style hook for the feed: `alert-high` or `alert-medium`.
    pub class: &'static str,
}

impl From<&Alert> for AlertEntry {
    fn from(alert: &Alert) -> Self {
        Self {
            time: alert.time_label(),
            severity: alert.severity,
            level: alert.severity.label().to_string(),
            message: alert.message.clone(),
            class: match alert.severity {
                Severity::High => "alert-high",
                Severity::Elevated => "alert-medium",
            },
        }
    }
}

/// Chart series as two index-aligned arrays plus the threshold line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartView {
    pub labels: Vec<String>,
    pub values: Vec<u32>,
    pub threshold: u32,
}

impl Default for ChartView {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            values: Vec::new(),
            threshold: ALERT_THRESHOLD,
        }
    }
}

/// The latest state of every dashboard surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub metrics: MetricsView,
    pub status: Option<StatusView>,
    pub alerts: Vec<AlertEntry>,
    pub chart: ChartView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardUpdate {
    Snapshot(DashboardView),
    Metrics(MetricsView),
    Status(StatusView),
    Alerts { alerts: Vec<AlertEntry> },
    Chart(ChartView),
}

#[derive(Clone)]
pub struct DashboardBus {
    pub updates_tx: broadcast::Sender<DashboardUpdate>,
}

impl DashboardBus {
    pub fn new(capacity: usize) -> Self {
        let (updates_tx, _) = broadcast::channel::<DashboardUpdate>(capacity.max(1));
        Self { updates_tx }
    }
}

/// Presentation sink that keeps the latest view and broadcasts every render.
pub struct BroadcastSink {
    bus: DashboardBus,
    view: RwLock<DashboardView>,
}

impl BroadcastSink {
    pub fn new(bus: DashboardBus) -> Self {
        Self {
            bus,
            view: RwLock::new(DashboardView::default()),
        }
    }

    pub fn view(&self) -> DashboardView {
        self.view.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.bus.updates_tx.subscribe()
    }

    fn publish(&self, update: DashboardUpdate) {
        {
            let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
            match &update {
                DashboardUpdate::Snapshot(snapshot) => *view = snapshot.clone(),
                DashboardUpdate::Metrics(metrics) => view.metrics = *metrics,
                DashboardUpdate::Status(status) => view.status = Some(status.clone()),
                DashboardUpdate::Alerts { alerts } => view.alerts = alerts.clone(),
                DashboardUpdate::Chart(chart) => view.chart = chart.clone(),
            }
        }
        // No subscribers is fine; the view above still serves snapshots.
        let _ = self.bus.updates_tx.send(update);
    }
}

impl PresentationSink for BroadcastSink {
    fn render_metrics(&self, threat_level: u32, incidents: u64, weapons: u64, people: u32) {
        self.publish(DashboardUpdate::Metrics(MetricsView {
            threat_level,
            incidents,
            weapons,
            people,
        }));
    }

    fn render_status_band(&self, status: ThreatStatus) {
        let threat_level = self
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics
            .threat_level;
        self.publish(DashboardUpdate::Status(StatusView {
            status,
            label: status.label().to_string(),
            detail: status.detail(threat_level),
        }));
    }

    fn render_alerts(&self, alerts: &[Alert]) {
        self.publish(DashboardUpdate::Alerts {
            alerts: alerts.iter().map(AlertEntry::from).collect(),
        });
    }

    fn render_chart(&self, samples: &[Observation]) {
        self.publish(DashboardUpdate::Chart(ChartView {
            labels: samples.iter().map(Observation::label).collect(),
            values: samples.iter().map(|o| o.value).collect(),
            threshold: ALERT_THRESHOLD,
        }));
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[cfg(feature = "web")]
pub async fn start_server(sink: Arc<BroadcastSink>, cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    use axum::extract::State;
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::response::{Html, IntoResponse};
    use axum::routing::get;
    use axum::{Json, Router};
    use tokio::sync::broadcast::error::RecvError;
    use tracing::{debug, error, info};

    const INDEX_HTML: &str = r##"<!doctype html>
<html><head><meta charset="utf-8"><title>Drishti</title>
<style>
body{font-family:sans-serif;margin:16px;background:#fafafa}
.metrics span{display:inline-block;margin-right:24px;font-size:20px}
.status-high{color:#d32f2f}.status-elevated{color:#f57c00}.status-normal{color:#388e3c}
.alert-high{color:#d32f2f}.alert-medium{color:#f57c00}
</style></head>
<body>
<h2>Drishti Threat Monitor</h2>
<div class="metrics">
<span>Threat <b id="threat">0%</b></span><span>Incidents <b id="incidents">0</b></span>
<span>Weapons <b id="weapons">0</b></span><span>People <b id="people">0</b></span>
</div>
<h3 id="status" class="status-normal">NORMAL</h3><div id="detail">No threats detected</div>
<svg id="chart" width="600" height="200" style="border:1px solid #ccc;background:#fff"></svg>
<div id="alerts"><p>No alerts</p></div>
<script>
(function(){
  const $ = (id)=>document.getElementById(id);
  const metrics = (m)=>{ $('threat').textContent=m.threat_level+'%'; $('incidents').textContent=m.incidents; $('weapons').textContent=m.weapons; $('people').textContent=m.people; };
  const status = (s)=>{ if(!s) return; $('status').textContent=s.label; $('status').className='status-'+s.status.toLowerCase(); $('detail').textContent=s.detail; };
  const alerts = (list)=>{ $('alerts').innerHTML = list.length===0 ? '<p>No alerts</p>' : list.map(a=>'<div class="'+a.class+'"><strong>'+a.time+'</strong> - '+a.level+': '+a.message+'</div>').join(''); };
  const chart = (c)=>{
    const w=600,h=200,n=Math.max(c.values.length-1,1);
    const pts=c.values.map((v,i)=>(i*w/n).toFixed(1)+','+(h-v*h/100).toFixed(1)).join(' ');
    const ty=(h-c.threshold*h/100).toFixed(1);
    $('chart').innerHTML='<line x1="0" x2="'+w+'" y1="'+ty+'" y2="'+ty+'" stroke="#f57c00" stroke-dasharray="5,5"/>'+
      '<polyline fill="none" stroke="#d32f2f" stroke-width="2" points="'+pts+'"/>';
  };
  const ws = new WebSocket((location.protocol==='https:'?'wss://':'ws://')+location.host+'/ws/updates');
  ws.onmessage = (ev)=>{
    const u = JSON.parse(ev.data);
    if(u.type==='snapshot'){ metrics(u.metrics); status(u.status); alerts(u.alerts); chart(u.chart); }
    else if(u.type==='metrics'){ metrics(u); }
    else if(u.type==='status'){ status(u); }
    else if(u.type==='alerts'){ alerts(u.alerts); }
    else if(u.type==='chart'){ chart(u); }
  };
})();
</script>
</body></html>"##;

    async fn send_update(socket: &mut WebSocket, update: &DashboardUpdate) -> anyhow::Result<()> {
        let text = serde_json::to_string(update)?;
        socket.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn stream_updates(mut socket: WebSocket, sink: Arc<BroadcastSink>) {
        let mut rx = sink.subscribe();
        if send_update(&mut socket, &DashboardUpdate::Snapshot(sink.view())).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Ok(update) => {
                        if send_update(&mut socket, &update).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "dashboard client lagging behind");
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    async fn ws_updates(ws: WebSocketUpgrade, State(sink): State<Arc<BroadcastSink>>) -> impl IntoResponse {
        ws.on_upgrade(move |socket| stream_updates(socket, sink))
    }

    async fn snapshot(State(sink): State<Arc<BroadcastSink>>) -> Json<DashboardView> {
        Json(sink.view())
    }

    let app = Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/snapshot", get(snapshot))
        .route("/ws/updates", get(ws_updates))
        .with_state(sink);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "dashboard server stopped");
        }
    });

    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(_sink: Arc<BroadcastSink>, _cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for drishti_dashboard"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn sink() -> BroadcastSink {
        BroadcastSink::new(DashboardBus::new(16))
    }

    #[test]
    fn renders_accumulate_into_view() {
        let sink = sink();
        sink.render_metrics(72, 1, 2, 3);
        sink.render_status_band(ThreatStatus::High);
        sink.render_alerts(&[Alert::new(Local::now(), Severity::High, "2 weapon(s) detected")]);
        sink.render_chart(&[Observation::new(Local::now(), 40), Observation::new(Local::now(), 72)]);

        let view = sink.view();
        assert_eq!(view.metrics.threat_level, 72);
        let status = view.status.unwrap();
        assert_eq!(status.label, "HIGH THREAT");
        assert_eq!(status.detail, "Threat Level: 72%");
        assert_eq!(view.alerts[0].class, "alert-high");
        assert_eq!(view.chart.values, vec![40, 72]);
        assert_eq!(view.chart.labels.len(), 2);
        assert_eq!(view.chart.threshold, 70);
    }

    #[tokio::test]
    async fn subscribers_receive_tagged_updates() {
        let sink = sink();
        let mut rx = sink.subscribe();
        sink.render_metrics(10, 0, 0, 1);
        sink.render_status_band(ThreatStatus::Normal);

        let first = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "metrics");
        assert_eq!(first["threat_level"], 10);

        let second = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "status");
        assert_eq!(second["status"], "NORMAL");
        assert_eq!(second["detail"], "No threats detected");
    }

    #[test]
    fn rendering_without_subscribers_is_harmless() {
        let sink = sink();
        sink.render_alerts(&[]);
        assert!(sink.view().alerts.is_empty());
    }

    #[cfg(feature = "web")]
    async fn http_get(addr: &str, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[cfg(feature = "web")]
    #[tokio::test]
    async fn server_serves_health_snapshot_and_page() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let addr = format!("127.0.0.1:{port}");

        let dashboard = Arc::new(sink());
        dashboard.render_metrics(81, 2, 1, 3);
        dashboard.render_status_band(ThreatStatus::High);
        let server = start_server(
            dashboard.clone(),
            ServerConfig {
                bind_addr: addr.clone(),
            },
        )
        .await
        .unwrap();

        let health = http_get(&addr, "/healthz").await;
        assert!(health.starts_with("HTTP/1.1 200"), "{health}");
        assert!(health.ends_with("ok"));

        let snapshot = http_get(&addr, "/api/snapshot").await;
        assert!(snapshot.starts_with("HTTP/1.1 200"), "{snapshot}");
        let body = snapshot.split("\r\n\r\n").nth(1).unwrap();
        let view: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(view["metrics"]["threat_level"], 81);
        assert_eq!(view["metrics"]["incidents"], 2);
        assert_eq!(view["status"]["label"], "HIGH THREAT");
        assert_eq!(view["chart"]["threshold"], 70);

        let page = http_get(&addr, "/").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains(r##"stroke="#f57c00""##));
        assert!(page.trim_end().ends_with("</body></html>"));

        server.abort();
    }

    #[cfg(not(feature = "web"))]
    #[tokio::test]
    async fn server_requires_web_feature() {
        let cfg = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
        };
        assert!(start_server(Arc::new(sink()), cfg).await.is_err());
    }
}
