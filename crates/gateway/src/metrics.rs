use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

pub struct GatewayMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    ws_clients_connected: AtomicI64,
    ws_protocol_violations_total: AtomicU64,
    broadcast_passes_total: AtomicU64,
    entity_frames_sent_total: AtomicU64,
    send_failures_total: AtomicU64,
}

static GLOBAL_METRICS: OnceLock<Arc<GatewayMetrics>> = OnceLock::new();

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            ws_clients_connected: AtomicI64::new(0),
            ws_protocol_violations_total: AtomicU64::new(0),
            broadcast_passes_total: AtomicU64::new(0),
            entity_frames_sent_total: AtomicU64::new(0),
            send_failures_total: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<GatewayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<GatewayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_http_request(method: &str, path: &str, status_code: u16, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_http_request(method, path, status_code, latency_ms);
    }
}

pub fn ws_client_connected() {
    if let Some(metrics) = global_metrics() {
        metrics.ws_clients_connected.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn ws_client_disconnected() {
    if let Some(metrics) = global_metrics() {
        metrics.ws_clients_connected.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn increment_ws_protocol_violations() {
    if let Some(metrics) = global_metrics() {
        metrics.ws_protocol_violations_total.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn increment_broadcast_passes() {
    if let Some(metrics) = global_metrics() {
        metrics.broadcast_passes_total.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn increment_entity_frames_sent() {
    if let Some(metrics) = global_metrics() {
        metrics.entity_frames_sent_total.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn increment_send_failures() {
    if let Some(metrics) = global_metrics() {
        metrics.send_failures_total.fetch_add(1, Ordering::SeqCst);
    }
}

impl GatewayMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP gateway_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE gateway_request_rate_total counter\n");
        append_counter_lines(&mut output, "gateway_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP gateway_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE gateway_request_errors_total counter\n");
        append_counter_lines(
            &mut output,
            "gateway_request_errors_total",
            &self.request_errors_total,
        );

        output.push_str("# HELP gateway_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE gateway_request_duration_ms_sum counter\n");
        append_counter_lines(
            &mut output,
            "gateway_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP gateway_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE gateway_request_duration_ms_count counter\n");
        append_counter_lines(
            &mut output,
            "gateway_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str(
            "# HELP gateway_ws_clients_connected Currently connected websocket clients.\n",
        );
        output.push_str("# TYPE gateway_ws_clients_connected gauge\n");
        output.push_str(&format!(
            "gateway_ws_clients_connected {}\n",
            self.ws_clients_connected.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP gateway_ws_protocol_violations_total Websocket connections closed for malformed frames.\n");
        output.push_str("# TYPE gateway_ws_protocol_violations_total counter\n");
        output.push_str(&format!(
            "gateway_ws_protocol_violations_total {}\n",
            self.ws_protocol_violations_total.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP gateway_broadcast_passes_total Completed world snapshot broadcast passes.\n",
        );
        output.push_str("# TYPE gateway_broadcast_passes_total counter\n");
        output.push_str(&format!(
            "gateway_broadcast_passes_total {}\n",
            self.broadcast_passes_total.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP gateway_entity_frames_sent_total Entity frames delivered to clients.\n",
        );
        output.push_str("# TYPE gateway_entity_frames_sent_total counter\n");
        output.push_str(&format!(
            "gateway_entity_frames_sent_total {}\n",
            self.entity_frames_sent_total.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP gateway_send_failures_total Clients dropped for a full or closed outbound channel.\n");
        output.push_str("# TYPE gateway_send_failures_total counter\n");
        output.push_str(&format!(
            "gateway_send_failures_total {}\n",
            self.send_failures_total.load(Ordering::SeqCst)
        ));

        output
    }
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if uuid::Uuid::parse_str(segment).is_ok() {
            normalized_segments.push("{uuid}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

fn increment_counter(
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
    key: &EndpointMetricKey,
    delta: u64,
) {
    let mut guard = map.lock().expect("metrics map lock poisoned");
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_counter_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = map.lock().expect("metrics map lock poisoned");
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left_key, _), (right_key, _)| {
        left_key
            .method
            .cmp(&right_key.method)
            .then_with(|| left_key.endpoint.cmp(&right_key.endpoint))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{method=\"{}\",endpoint=\"{}\"}} {value}\n",
            escape_label_value(&key.method),
            escape_label_value(&key.endpoint),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::GatewayMetrics;

    #[test]
    fn render_prometheus_includes_http_and_ws_metrics() {
        let metrics = GatewayMetrics::default();
        metrics.record_http_request("GET", "/v1/world/rooms", 200, 12);
        metrics.record_http_request("GET", "/v1/world/rooms", 503, 8);
        metrics.ws_clients_connected.store(3, Ordering::SeqCst);
        metrics.ws_protocol_violations_total.store(1, Ordering::SeqCst);
        metrics.broadcast_passes_total.store(42, Ordering::SeqCst);
        metrics.entity_frames_sent_total.store(120, Ordering::SeqCst);
        metrics.send_failures_total.store(2, Ordering::SeqCst);

        let rendered = metrics.render_prometheus();

        assert!(rendered.contains("gateway_request_rate_total"));
        assert!(rendered
            .contains("gateway_request_rate_total{method=\"GET\",endpoint=\"/v1/world/rooms\"} 2"));
        assert!(rendered.contains(
            "gateway_request_errors_total{method=\"GET\",endpoint=\"/v1/world/rooms\"} 1"
        ));
        assert!(rendered.contains("gateway_request_duration_ms_sum"));
        assert!(rendered.contains("gateway_request_duration_ms_count"));
        assert!(rendered.contains("gateway_ws_clients_connected 3"));
        assert!(rendered.contains("gateway_ws_protocol_violations_total 1"));
        assert!(rendered.contains("gateway_broadcast_passes_total 42"));
        assert!(rendered.contains("gateway_entity_frames_sent_total 120"));
        assert!(rendered.contains("gateway_send_failures_total 2"));
    }

    #[test]
    fn numeric_path_segments_are_normalized() {
        let metrics = GatewayMetrics::default();
        metrics.record_http_request("GET", "/v1/world/rooms/42", 200, 1);

        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("endpoint=\"/v1/world/rooms/{number}\""));
    }
}
