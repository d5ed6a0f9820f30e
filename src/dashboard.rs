use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use tower_http::cors::CorsLayer;

use crate::{
    config::Settings,
    pools, regime,
    store::CsvStore,
    tasks::{TaskClient, TaskName, TriggerOutcome},
};

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub store: CsvStore,
    pub tasks: TaskClient,
}

pub async fn serve(settings: Settings, store: CsvStore, tasks: TaskClient) -> Result<()> {
    let state = DashboardState {
        settings: settings.clone(),
        store,
        tasks,
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/api/health", get(api_health))
        .route("/api/market-regime", get(api_market_regime))
        .route("/api/active-pool", get(api_active_pool))
        .route("/api/full-pool", get(api_full_pool))
        .route("/api/watchlist", get(api_watchlist))
        .route("/api/tasks/status", get(api_tasks_status))
        .route("/api/tasks/{name}", post(api_trigger_task))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port)
        .parse()
        .context("dashboard addr parse")?;

    log::info!("dashboard.start url=http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("dashboard.signal_error err={e}");
        return;
    }
    log::info!("dashboard.shutdown signal=ctrl_c");
}

fn source_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    let s = &st.settings;
    Html(render_index_html(
        &s.dashboard_host,
        s.dashboard_port,
        &s.data_root,
        &s.task_api_base,
        s.distribution_window,
        s.history_window,
    ))
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    let s = &st.settings;
    let mut sources = serde_json::Map::new();
    for rel in [
        &s.regime_file,
        &s.segments_file,
        &s.active_pool_file,
        &s.full_pool_file,
        &s.watchlist_file,
    ] {
        let mtime = match st.store.modified_at(rel) {
            Some(ts) => JsonValue::String(ts),
            None => JsonValue::Null,
        };
        sources.insert(rel.clone(), mtime);
    }
    Json(serde_json::json!({
        "status": "ok",
        "ts": now_iso(),
        "dataRoot": st.store.root().display().to_string(),
        "sources": sources,
    }))
}

async fn api_market_regime(State(st): State<DashboardState>) -> impl IntoResponse {
    let snap = st.store.snapshot(&st.settings.regime_file);
    let points = regime::points_from_rows(&snap.rows);
    if points.is_empty() {
        let name = source_name(&st.settings.regime_file);
        return Json(serde_json::json!({
            "data": null,
            "message": format!("{name} has no rows yet"),
        }));
    }

    let seg_snap = st.store.snapshot(&st.settings.segments_file);
    let records = regime::segment_records(&seg_snap.rows);
    let report = regime::summarize(
        &points,
        records.last(),
        st.settings.history_window,
        st.settings.distribution_window,
        snap.updated_at.clone(),
    );
    Json(serde_json::json!({ "data": report }))
}

async fn api_active_pool(State(st): State<DashboardState>) -> impl IntoResponse {
    let snap = st.store.snapshot(&st.settings.active_pool_file);
    let meta = pools::active_pool_meta(&snap.rows, snap.updated_at.clone());
    Json(serde_json::json!({ "data": &*snap.rows, "meta": meta }))
}

async fn api_full_pool(State(st): State<DashboardState>) -> impl IntoResponse {
    let snap = st.store.snapshot(&st.settings.full_pool_file);
    let today = Utc::now().date_naive();
    let meta = pools::full_pool_meta(&snap.rows, today, snap.updated_at.clone());
    Json(serde_json::json!({ "data": &*snap.rows, "meta": meta }))
}

async fn api_watchlist(State(st): State<DashboardState>) -> impl IntoResponse {
    let snap = st.store.snapshot(&st.settings.watchlist_file);
    Json(serde_json::json!({ "data": &*snap.rows }))
}

async fn api_tasks_status(State(st): State<DashboardState>) -> impl IntoResponse {
    match st.tasks.statuses().await {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => {
            log::warn!("tasks.status_error err={e:#}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn api_trigger_task(
    State(st): State<DashboardState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    // Unknown names are rejected locally; the runner never sees them.
    let Some(task) = TaskName::parse(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "task not found" })),
        )
            .into_response();
    };

    log::info!("tasks.trigger name={task}");
    match st.tasks.trigger(task).await {
        Ok(TriggerOutcome::Started { message }) => {
            Json(serde_json::json!({ "message": message })).into_response()
        }
        Ok(TriggerOutcome::Rejected { status, detail }) => {
            log::warn!("tasks.rejected name={task} status={status} detail={detail}");
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (code, Json(serde_json::json!({ "detail": detail }))).into_response()
        }
        Err(e) => {
            log::warn!("tasks.trigger_error name={task} err={e:#}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn render_index_html(
    host: &str,
    port: u16,
    data_root: &str,
    task_api: &str,
    dist_window: usize,
    hist_window: usize,
) -> String {
    // Single-file UI on purpose: no build step, one binary to deploy.
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Quantboard • Pipeline Ops</title>
    <style>
      :root {{
        --bg: #0a1018;
        --panel: rgba(255,255,255,0.05);
        --stroke: rgba(255,255,255,0.12);
        --text: rgba(255,255,255,0.92);
        --muted: rgba(255,255,255,0.60);
        --good: #33d17a;
        --bad: #ff5d5d;
        --warn: #ffcc00;
        --brand: #2dd4bf;
        --bull: #15803d;
        --side: #2563eb;
        --bear: #b91c1c;
      }}
      * {{ box-sizing: border-box; }}
      body {{
        margin: 0;
        font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
        color: var(--text);
        background: radial-gradient(1100px 800px at 12% 8%, rgba(45,212,191,0.14), transparent 60%),
                    radial-gradient(900px 700px at 88% 18%, rgba(37,99,235,0.12), transparent 55%),
                    var(--bg);
      }}
      .wrap {{ max-width: 1280px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 16px; border: 1px solid var(--stroke); border-radius: 16px;
        background: linear-gradient(180deg, rgba(255,255,255,0.06), rgba(255,255,255,0.02));
      }}
      .brand {{ display: flex; align-items: center; gap: 12px; }}
      .logo {{
        width: 40px; height: 40px; border-radius: 12px;
        background: conic-gradient(from 200deg, var(--brand), var(--side), var(--brand));
      }}
      .title {{ font-weight: 800; letter-spacing: 0.2px; }}
      .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; }}
      .chips {{ display: flex; flex-wrap: wrap; gap: 8px; justify-content: flex-end; }}
      .chip {{
        padding: 7px 10px; border-radius: 999px; border: 1px solid var(--stroke);
        background: rgba(255,255,255,0.04); font-size: 12px; color: var(--muted);
        white-space: nowrap;
      }}
      .chip b {{ color: var(--text); font-weight: 700; }}
      .grid {{ display: grid; gap: 14px; margin-top: 14px; grid-template-columns: repeat(12, 1fr); }}
      .card {{ border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
      .card .hd {{
        display: flex; align-items: center; justify-content: space-between; gap: 10px;
        padding: 12px 14px; border-bottom: 1px solid rgba(255,255,255,0.08);
        background: rgba(255,255,255,0.03);
      }}
      .card .hd .h {{ font-weight: 800; letter-spacing: 0.2px; }}
      .card .bd {{ padding: 12px 14px; }}
      .pill {{ font-size: 12px; color: var(--muted); border: 1px solid var(--stroke); padding: 3px 8px; border-radius: 999px; background: rgba(255,255,255,0.04); }}
      .kpis {{ display: grid; gap: 10px; grid-template-columns: repeat(3, 1fr); }}
      .kpis.four {{ grid-template-columns: repeat(4, 1fr); }}
      .kpi {{
        border: 1px solid rgba(255,255,255,0.10); border-radius: 14px; padding: 12px;
        background: linear-gradient(180deg, rgba(255,255,255,0.05), rgba(255,255,255,0.02));
      }}
      .kpi .lbl {{ color: var(--muted); font-size: 12px; }}
      .kpi .val {{ font-size: 22px; font-weight: 850; margin-top: 6px; letter-spacing: -0.3px; }}
      .kpi .sub {{ color: var(--muted); font-size: 12px; margin-top: 5px; }}
      .good {{ color: var(--good); }}
      .bad {{ color: var(--bad); }}
      .warn {{ color: var(--warn); }}
      .muted {{ color: var(--muted); }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 9px 10px; border-bottom: 1px solid rgba(255,255,255,0.07); vertical-align: top; }}
      th {{ text-align: left; color: var(--muted); font-size: 12px; font-weight: 700; }}
      td {{ font-size: 13px; }}
      .row2 {{ color: var(--muted); font-size: 12px; margin-top: 6px; }}
      .mono {{ font-family: ui-monospace, SFMono-Regular, Menlo, Monaco, Consolas, monospace; }}
      .tag {{
        display: inline-block; padding: 3px 8px; border-radius: 999px;
        border: 1px solid rgba(255,255,255,0.12); background: rgba(255,255,255,0.04);
        color: var(--muted); font-size: 12px;
      }}
      .tag.running {{ color: var(--warn); border-color: rgba(255,204,0,0.45); }}
      .tag.success {{ color: var(--good); border-color: rgba(51,209,122,0.45); }}
      .tag.failed {{ color: var(--bad); border-color: rgba(255,93,93,0.45); }}
      .btn {{
        cursor: pointer; padding: 7px 10px; border-radius: 10px;
        border: 1px solid rgba(255,255,255,0.12); background: rgba(255,255,255,0.05);
        color: var(--text); font-weight: 700; font-size: 12px;
      }}
      .btn:hover {{ background: rgba(255,255,255,0.09); }}
      .btn:disabled {{ cursor: default; opacity: 0.45; }}
      .hero {{ display: flex; align-items: center; gap: 14px; margin-bottom: 12px; }}
      .hero .dot {{ width: 18px; height: 18px; border-radius: 50%; flex: none; }}
      .hero .big {{ font-size: 26px; font-weight: 850; letter-spacing: -0.3px; }}
      .strip {{ display: flex; gap: 2px; margin-top: 8px; }}
      .strip .cell {{ flex: 1 1 0; height: 26px; border-radius: 3px; min-width: 4px; }}
      .legend {{ display: flex; gap: 14px; margin-top: 8px; color: var(--muted); font-size: 12px; }}
      .swatch {{ display: inline-block; width: 10px; height: 10px; border-radius: 2px; margin-right: 5px; }}
      .task {{
        display: flex; align-items: center; justify-content: space-between; gap: 10px;
        padding: 10px 0; border-bottom: 1px solid rgba(255,255,255,0.07);
      }}
      .task:last-child {{ border-bottom: none; }}
      .task .name {{ font-weight: 750; }}
      .task .desc {{ color: var(--muted); font-size: 12px; margin-top: 3px; }}
      .task .when {{ color: var(--muted); font-size: 11px; margin-top: 3px; }}
      .banner {{
        margin-top: 12px; padding: 10px 12px; border-radius: 14px;
        border: 1px solid rgba(255,255,255,0.14); background: rgba(255,93,93,0.10);
        display: none;
      }}
      .banner pre {{ margin: 8px 0 0; white-space: pre-wrap; word-break: break-word; }}
      .footer {{ margin-top: 14px; color: var(--muted); font-size: 12px; }}
      .col-12 {{ grid-column: span 12; }}
      .col-8 {{ grid-column: span 8; }}
      .col-6 {{ grid-column: span 6; }}
      .col-4 {{ grid-column: span 4; }}
      @media (max-width: 1100px) {{
        .kpis, .kpis.four {{ grid-template-columns: repeat(2, 1fr); }}
        .col-8, .col-6, .col-4 {{ grid-column: span 12; }}
      }}
    </style>
  </head>
  <body>
    <div class="wrap">
      <div class="topbar">
        <div class="brand">
          <div class="logo"></div>
          <div>
            <div class="title">Quantboard • Pipeline Ops</div>
            <div class="subtitle">
              Local: <span class="mono">{host}:{port}</span> • data root: <span class="mono">{data_root}</span>
            </div>
          </div>
        </div>
        <div class="chips">
          <div class="chip">Task API: <b class="mono">{task_api}</b></div>
          <div class="chip">Status: <b id="statusText">starting…</b></div>
          <div class="chip">Clock: <b id="clock">--:--:--</b></div>
          <button class="btn" id="refreshBtn">Refresh</button>
        </div>
      </div>

      <div class="banner" id="errBanner">
        <div style="font-weight:850;">Something is failing (details)</div>
        <div class="row2" id="errBannerMsg">--</div>
        <pre class="mono" id="errBannerDetail"></pre>
      </div>

      <div class="grid">
        <div class="card col-8">
          <div class="hd">
            <div class="h">Market Regime</div>
            <div class="pill" id="regimeMeta">--</div>
          </div>
          <div class="bd">
            <div class="hero">
              <div class="dot" id="regimeDot" style="background: var(--muted);"></div>
              <div>
                <div class="big" id="regimeLabel">--</div>
                <div class="row2" id="regimeSub">waiting for data…</div>
              </div>
            </div>
            <div class="kpis">
              <div class="kpi">
                <div class="lbl"><span class="swatch" style="background: var(--bull);"></span>Bull days</div>
                <div class="val" id="distBull">--</div>
                <div class="sub">of last {dist_window} observed</div>
              </div>
              <div class="kpi">
                <div class="lbl"><span class="swatch" style="background: var(--side);"></span>Sideways days</div>
                <div class="val" id="distSideways">--</div>
                <div class="sub">of last {dist_window} observed</div>
              </div>
              <div class="kpi">
                <div class="lbl"><span class="swatch" style="background: var(--bear);"></span>Bear days</div>
                <div class="val" id="distBear">--</div>
                <div class="sub">of last {dist_window} observed</div>
              </div>
            </div>
            <div style="margin-top:12px;">
              <div class="row2">History (last {hist_window} trading days)</div>
              <div class="strip" id="historyStrip"></div>
              <div class="legend">
                <span><span class="swatch" style="background: var(--bull);"></span>bull</span>
                <span><span class="swatch" style="background: var(--side);"></span>sideways</span>
                <span><span class="swatch" style="background: var(--bear);"></span>bear</span>
                <span id="prevSegment"></span>
              </div>
            </div>
          </div>
        </div>

        <div class="card col-4">
          <div class="hd">
            <div class="h">Pipeline Tasks</div>
            <div class="pill" id="tasksMeta">--</div>
          </div>
          <div class="bd">
            <div id="taskList"></div>
            <div class="row2">Runs go through the task backend; a task already running is rejected with 409.</div>
          </div>
        </div>

        <div class="card col-6">
          <div class="hd">
            <div class="h">Active Pool</div>
            <div class="pill" id="activeMeta">--</div>
          </div>
          <div class="bd">
            <div class="kpis four">
              <div class="kpi">
                <div class="lbl">ETFs in pool</div>
                <div class="val" id="activeTotal">--</div>
              </div>
              <div class="kpi">
                <div class="lbl">Avg turnover (60d)</div>
                <div class="val" id="activeAmount">--</div>
              </div>
              <div class="kpi">
                <div class="lbl">Avg traded-day ratio</div>
                <div class="val" id="activeRatio">--</div>
              </div>
              <div class="kpi">
                <div class="lbl">Median range (60d)</div>
                <div class="val" id="activeRange">--</div>
              </div>
            </div>
            <table style="margin-top:12px;">
              <thead>
                <tr>
                  <th class="mono">code</th>
                  <th>name</th>
                  <th>turnover 60d</th>
                  <th>traded ratio</th>
                  <th>range</th>
                </tr>
              </thead>
              <tbody id="activeRows"></tbody>
            </table>
          </div>
        </div>

        <div class="card col-6">
          <div class="hd">
            <div class="h">Full Pool</div>
            <div class="pill" id="fullMeta">--</div>
          </div>
          <div class="bd">
            <div class="kpis">
              <div class="kpi">
                <div class="lbl">Instruments</div>
                <div class="val" id="fullTotal">--</div>
              </div>
              <div class="kpi">
                <div class="lbl">Listed in last 30d</div>
                <div class="val" id="fullNew">--</div>
              </div>
              <div class="kpi">
                <div class="lbl">Anomalies</div>
                <div class="val" id="fullAnomalies">--</div>
                <div class="sub">rows missing code or name</div>
              </div>
            </div>
            <table style="margin-top:12px;">
              <thead>
                <tr>
                  <th class="mono">code</th>
                  <th>name</th>
                  <th>exchange</th>
                  <th>listed</th>
                  <th>state</th>
                </tr>
              </thead>
              <tbody id="fullRows"></tbody>
            </table>
          </div>
        </div>

        <div class="card col-12">
          <div class="hd">
            <div class="h">Today's Watchlist</div>
            <div class="pill" id="watchMeta">--</div>
          </div>
          <div class="bd">
            <table>
              <thead>
                <tr>
                  <th class="mono">code</th>
                  <th>name</th>
                  <th>tier</th>
                  <th>env</th>
                  <th>score</th>
                  <th>close</th>
                  <th>chg%</th>
                </tr>
              </thead>
              <tbody id="watchRows"></tbody>
            </table>
          </div>
        </div>
      </div>

      <div class="footer">
        Tip: point <span class="mono">QUANT_DATA_ROOT</span> at the pipeline's data directory; this page never writes to it.
      </div>
    </div>

    <script>
      const TASKS = [
        {{ name: "daily_routine", label: "Daily routine", desc: "Bars → universe → regime → watchlist" }},
        {{ name: "daily", label: "Daily bars", desc: "Incremental daily bar download" }},
        {{ name: "full_pool", label: "Full pool refresh", desc: "Rebuild the instrument master list" }},
        {{ name: "backfill_daily", label: "Backfill bars", desc: "Backfill history, then recompute indicators" }},
        {{ name: "watchlist", label: "Watchlist", desc: "Generate today's watchlist" }},
        {{ name: "auto", label: "Auto pipeline", desc: "Full end-to-end refresh" }},
      ];
      const SUSPENDED = new Set(["S", "1", "SUSPEND", "Y"]);
      const EXCHANGES = {{ SH: "Shanghai", SZ: "Shenzhen", BJ: "Beijing" }};

      const fmtNum = (x, d=2) => {{
        if (x === null || x === undefined || x === "") return "--";
        const n = Number(x);
        if (!Number.isFinite(n)) return "--";
        return n.toFixed(d);
      }};
      const fmtCompact = (x) => {{
        if (x === null || x === undefined) return "--";
        const n = Number(x);
        if (!Number.isFinite(n)) return "--";
        const abs = Math.abs(n);
        if (abs >= 1e9) return (n/1e9).toFixed(2) + "B";
        if (abs >= 1e6) return (n/1e6).toFixed(2) + "M";
        if (abs >= 1e3) return (n/1e3).toFixed(1) + "K";
        return n.toFixed(0);
      }};
      const fmtPct = (x, d=1) => {{
        const n = Number(x);
        if (!Number.isFinite(n)) return "--";
        return (100*n).toFixed(d) + "%";
      }};
      const fmtWhen = (iso) => {{
        if (!iso) return "--";
        const d = new Date(iso);
        return Number.isNaN(d.getTime()) ? "--" : d.toLocaleString();
      }};
      const fmtAgo = (iso) => {{
        if (!iso) return "--";
        const t = new Date(iso).getTime();
        if (Number.isNaN(t)) return "--";
        const s = Math.max(0, (Date.now() - t)/1000);
        if (s < 60) return "just now";
        const m = s/60;
        if (m < 60) return `${{Math.floor(m)}}m ago`;
        const h = m/60;
        if (h < 48) return `${{h.toFixed(1)}}h ago`;
        return `${{Math.floor(h/24)}}d ago`;
      }};
      const fmtListDate = (iso) => {{
        if (!iso || iso === "00000000") return "--";
        return iso;
      }};

      async function getJson(path) {{
        const r = await fetch(path, {{ cache: "no-store" }});
        if (!r.ok) {{
          let body = "";
          try {{ body = await r.text(); }} catch (e) {{}}
          throw new Error(`${{path}} -> ${{r.status}}${{body ? ("\\n" + body) : ""}}`);
        }}
        return await r.json();
      }}

      function setStatus(ok, msg) {{
        const el = document.getElementById("statusText");
        el.textContent = msg;
        el.className = ok ? "good" : "bad";
      }}

      function showBanner(msg, detail) {{
        const b = document.getElementById("errBanner");
        document.getElementById("errBannerMsg").textContent = msg || "--";
        document.getElementById("errBannerDetail").textContent = detail || "";
        b.style.display = "block";
      }}
      function hideBanner() {{
        document.getElementById("errBanner").style.display = "none";
      }}

      function escapeHtml(s) {{
        return (s ?? "").toString()
          .replaceAll("&","&amp;").replaceAll("<","&lt;").replaceAll(">","&gt;")
          .replaceAll('"',"&quot;").replaceAll("'","&#039;");
      }}

      function renderRegime(payload) {{
        const dot = document.getElementById("regimeDot");
        const label = document.getElementById("regimeLabel");
        const sub = document.getElementById("regimeSub");
        const strip = document.getElementById("historyStrip");
        const meta = document.getElementById("regimeMeta");

        if (!payload || !payload.data) {{
          label.textContent = "No data yet";
          sub.textContent = (payload && payload.message) ? payload.message : "--";
          dot.style.background = "var(--muted)";
          meta.textContent = "--";
          strip.innerHTML = "";
          document.getElementById("distBull").textContent = "--";
          document.getElementById("distSideways").textContent = "--";
          document.getElementById("distBear").textContent = "--";
          document.getElementById("prevSegment").textContent = "";
          return;
        }}

        const d = payload.data;
        const cur = d.current;
        const curColor = d.history.points.length
          ? d.history.points[d.history.points.length - 1].color
          : "var(--muted)";
        dot.style.background = curColor;
        label.textContent = cur.regimeLabel;
        sub.textContent = `${{cur.streakDays}} trading days • since ${{cur.since}} • as of ${{cur.date}}`;

        const counts = d.distribution30d.counts;
        document.getElementById("distBull").textContent = String(counts.bull);
        document.getElementById("distSideways").textContent = String(counts.sideways);
        document.getElementById("distBear").textContent = String(counts.bear);

        strip.innerHTML = "";
        for (const p of d.history.points) {{
          const cell = document.createElement("div");
          cell.className = "cell";
          cell.style.background = p.color;
          cell.title = `${{p.date}} • ${{p.regime}}`;
          strip.appendChild(cell);
        }}

        const prevEl = document.getElementById("prevSegment");
        prevEl.textContent = d.previous
          ? `previous: ${{d.previous.regime}} × ${{d.previous.days}} (until ${{d.previous.end}})`
          : "previous: --";

        meta.textContent = d.meta.updatedAt
          ? `${{d.meta.totalRows}} rows • updated ${{fmtAgo(d.meta.updatedAt)}}`
          : `${{d.meta.totalRows}} rows`;
      }}

      function renderTasks(statuses) {{
        const list = document.getElementById("taskList");
        list.innerHTML = "";
        for (const t of TASKS) {{
          const s = (statuses && statuses[t.name]) || {{ status: "idle" }};
          const st = (s.status || "idle").toString();
          const cls = (st === "running" || st === "success" || st === "failed") ? st : "";
          const when = st === "running"
            ? `started ${{fmtWhen(s.started_at)}}`
            : (s.finished_at ? `finished ${{fmtWhen(s.finished_at)}}${{s.duration_seconds != null ? ` • ${{fmtNum(s.duration_seconds, 1)}}s` : ""}}` : "never run");
          const note = s.message ? `<div class="when mono">${{escapeHtml(s.message)}}</div>` : "";
          const row = document.createElement("div");
          row.className = "task";
          row.innerHTML = `
            <div>
              <div class="name">${{escapeHtml(t.label)}} <span class="tag ${{cls}}">${{escapeHtml(st)}}</span></div>
              <div class="desc">${{escapeHtml(t.desc)}}</div>
              <div class="when">${{escapeHtml(when)}}</div>
              ${{note}}
            </div>
            <button class="btn" data-task="${{t.name}}" ${{st === "running" ? "disabled" : ""}}>Run</button>
          `;
          list.appendChild(row);
        }}
        for (const btn of list.querySelectorAll("button[data-task]")) {{
          btn.addEventListener("click", () => runTask(btn.dataset.task));
        }}
      }}

      async function runTask(name) {{
        try {{
          const r = await fetch(`/api/tasks/${{name}}`, {{ method: "POST" }});
          const body = await r.json().catch(() => ({{}}));
          if (!r.ok) {{
            throw new Error(body.detail || `${{name}} -> ${{r.status}}`);
          }}
          hideBanner();
        }} catch (e) {{
          showBanner(`Could not start ${{name}}`, (e && e.message) ? e.message : String(e));
        }}
        await refreshTasks();
      }}

      function renderActive(payload) {{
        const rows = payload.data || [];
        const meta = payload.meta || {{}};
        document.getElementById("activeTotal").textContent = String(meta.total ?? rows.length);
        document.getElementById("activeAmount").textContent = fmtCompact(meta.avgAmount60);
        document.getElementById("activeRatio").textContent = fmtPct(meta.avgTradeRatio60);
        document.getElementById("activeRange").textContent = fmtPct(meta.avgRange60);
        document.getElementById("activeMeta").textContent =
          meta.updatedAt ? `updated ${{fmtAgo(meta.updatedAt)}}` : "--";

        const tb = document.getElementById("activeRows");
        tb.innerHTML = "";
        for (const r of rows.slice(0, 12)) {{
          const tr = document.createElement("tr");
          tr.innerHTML = `
            <td class="mono">${{escapeHtml(r.ts_code)}}</td>
            <td>${{escapeHtml(r.name)}}</td>
            <td>${{fmtCompact(r.mean_amount_60)}}</td>
            <td>${{fmtPct(r.trade_days_ratio_60)}}</td>
            <td>${{fmtPct(r.median_range_60)}}</td>
          `;
          tb.appendChild(tr);
        }}
      }}

      function renderFull(payload) {{
        const rows = payload.data || [];
        const meta = payload.meta || {{}};
        document.getElementById("fullTotal").textContent = String(rows.length);
        document.getElementById("fullNew").textContent = String(meta.newWithin30d ?? "--");
        document.getElementById("fullAnomalies").textContent = String(meta.anomalyCount ?? "--");
        document.getElementById("fullMeta").textContent =
          meta.updatedAt ? `updated ${{fmtAgo(meta.updatedAt)}}` : "--";

        const tb = document.getElementById("fullRows");
        tb.innerHTML = "";
        for (const r of rows.slice(0, 12)) {{
          const suffix = ((r.ts_code || "").split(".")[1] || "").toUpperCase();
          const exch = EXCHANGES[suffix] || suffix || "--";
          let state = "active";
          let stateCls = "good";
          if (r.delist_date && r.delist_date !== "00000000") {{
            state = "delisted"; stateCls = "bad";
          }} else if (SUSPENDED.has((r.status || "").toUpperCase())) {{
            state = "suspended"; stateCls = "warn";
          }}
          const tr = document.createElement("tr");
          tr.innerHTML = `
            <td class="mono">${{escapeHtml(r.ts_code)}}</td>
            <td>${{escapeHtml(r.name)}}</td>
            <td>${{escapeHtml(exch)}}</td>
            <td class="mono">${{escapeHtml(fmtListDate(r.list_date))}}</td>
            <td class="${{stateCls}}">${{state}}</td>
          `;
          tb.appendChild(tr);
        }}
      }}

      function renderWatch(payload) {{
        const rows = payload.data || [];
        document.getElementById("watchMeta").textContent =
          rows.length ? `${{rows.length}} names` : "empty";
        const tb = document.getElementById("watchRows");
        tb.innerHTML = "";
        if (!rows.length) {{
          const tr = document.createElement("tr");
          tr.innerHTML = `<td colspan="7" class="muted">no watchlist generated today</td>`;
          tb.appendChild(tr);
          return;
        }}
        for (const r of rows.slice(0, 25)) {{
          const chg = Number(r.pct_chg);
          const chgCls = Number.isFinite(chg) ? (chg >= 0 ? "good" : "bad") : "";
          const tr = document.createElement("tr");
          tr.innerHTML = `
            <td class="mono">${{escapeHtml(r.ts_code)}}</td>
            <td>${{escapeHtml(r.name)}}</td>
            <td><span class="tag">${{escapeHtml(r.tier || "--")}}</span></td>
            <td>${{escapeHtml(r.env || "--")}}</td>
            <td>${{fmtNum(r.score, 1)}}</td>
            <td>${{fmtNum(r.close, 3)}}</td>
            <td class="${{chgCls}}">${{fmtNum(r.pct_chg, 2)}}</td>
          `;
          tb.appendChild(tr);
        }}
      }}

      async function refreshData() {{
        try {{
          const [regime, active, full, watch] = await Promise.all([
            getJson("/api/market-regime"),
            getJson("/api/active-pool"),
            getJson("/api/full-pool"),
            getJson("/api/watchlist"),
          ]);
          setStatus(true, "live");
          hideBanner();
          renderRegime(regime);
          renderActive(active);
          renderFull(full);
          renderWatch(watch);
        }} catch (e) {{
          setStatus(false, "disconnected");
          showBanner("Dashboard refresh failed", (e && e.message) ? e.message : String(e));
        }}
      }}

      async function refreshTasks() {{
        const meta = document.getElementById("tasksMeta");
        try {{
          const statuses = await getJson("/api/tasks/status");
          renderTasks(statuses);
          meta.textContent = "backend ok";
          meta.className = "pill";
        }} catch (e) {{
          renderTasks(null);
          meta.textContent = "backend offline";
          meta.className = "pill bad";
        }}
      }}

      function tickClock() {{
        document.getElementById("clock").textContent = new Date().toLocaleTimeString();
      }}

      document.getElementById("refreshBtn").addEventListener("click", () => {{
        refreshData();
        refreshTasks();
      }});
      tickClock();
      setInterval(tickClock, 1000);
      refreshData();
      refreshTasks();
      setInterval(refreshData, 30000);
      setInterval(refreshTasks, 5000);
    </script>
  </body>
</html>"#,
        host = host,
        port = port,
        data_root = data_root,
        task_api = task_api,
        dist_window = dist_window,
        hist_window = hist_window
    )
}
