//! Directed acyclic graph of [`Node`]s run in topological order.

use crate::error::ComputeError;
use crate::node::{socket_index, Data, Inputs, Node};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRunFailureInfo {
    pub node_name: String,
    pub message: String,
}

/// Why a graph run stopped.
#[derive(Debug, Error)]
#[error("node '{node_name}' failed: {error}")]
pub struct GraphRunFailureInfo {
    pub node_name: String,
    pub error: ComputeError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphEventKind {
    RunStarted,
    NodeStarted { node: String },
    NodeFinished { node: String, duration: Duration },
    NodeSkipped { node: String },
    NodeFailed(NodeRunFailureInfo),
    RunFinished { duration: Duration },
    RunFailed(NodeRunFailureInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEvent {
    pub run_id: Uuid,
    pub kind: GraphEventKind,
}

#[derive(Debug, Clone, Default)]
pub struct GraphRunReport {
    pub run_id: Uuid,
    pub node_durations: Vec<(String, Duration)>,
    pub skipped: Vec<String>,
    pub total: Duration,
}

struct Entry {
    name: String,
    node: Box<dyn Node>,
    enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    from: usize,
    output: usize,
    to: usize,
    input: usize,
}

#[derive(Default)]
pub struct NodeGraph {
    entries: Vec<Entry>,
    edges: Vec<Edge>,
    subscribers: Vec<mpsc::UnboundedSender<GraphEvent>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node + 'static) -> Result<(), ComputeError> {
        let name = name.into();
        if self.index_of(&name).is_ok() {
            return Err(ComputeError::DuplicateNode(name));
        }
        self.entries.push(Entry { name, node: Box::new(node), enabled: true });
        Ok(())
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    fn index_of(&self, name: &str) -> Result<usize, ComputeError> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ComputeError::NodeNotFound(name.to_owned()))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ComputeError> {
        let idx = self.index_of(name)?;
        self.entries[idx].enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> Result<bool, ComputeError> {
        Ok(self.entries[self.index_of(name)?].enabled)
    }

    /// Connects `from.output` to `to.input`. Each input takes at most one edge.
    pub fn connect_output_to(&mut self, from: &str, output: &str, to: &str, input: &str) -> Result<(), ComputeError> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        let out_sockets = self.entries[from_idx].node.outputs();
        let in_sockets = self.entries[to_idx].node.inputs();
        let out_i = socket_index(out_sockets, output)
            .ok_or_else(|| ComputeError::SocketNotFound { node: from.to_owned(), socket: output.to_owned() })?;
        let in_i = socket_index(in_sockets, input)
            .ok_or_else(|| ComputeError::SocketNotFound { node: to.to_owned(), socket: input.to_owned() })?;

        if out_sockets[out_i].data_type != in_sockets[in_i].data_type {
            return Err(ComputeError::TypeMismatch {
                from_node: from.to_owned(),
                output: output.to_owned(),
                to_node: to.to_owned(),
                input: input.to_owned(),
                expected: in_sockets[in_i].data_type,
                found: out_sockets[out_i].data_type,
            });
        }
        if self.edges.iter().any(|e| e.to == to_idx && e.input == in_i) {
            return Err(ComputeError::AlreadyConnected { node: to.to_owned(), socket: input.to_owned() });
        }
        if from_idx == to_idx || self.reaches(to_idx, from_idx) {
            return Err(ComputeError::CycleDetected { from_node: from.to_owned(), to_node: to.to_owned() });
        }
        self.edges.push(Edge { from: from_idx, output: out_i, to: to_idx, input: in_i });
        Ok(())
    }

    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.entries.len()];
        while let Some(n) = stack.pop() {
            if n == target {
                return true;
            }
            if std::mem::replace(&mut seen[n], true) {
                continue;
            }
            stack.extend(self.edges.iter().filter(|e| e.from == n).map(|e| e.to));
        }
        false
    }

    /// Kahn's algorithm; ties are broken by insertion order.
    fn topological_order(&self) -> Vec<usize> {
        let mut in_degree = vec![0usize; self.entries.len()];
        for e in &self.edges {
            in_degree[e.to] += 1;
        }
        let mut ready: BTreeSet<usize> = (0..self.entries.len()).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(n) = ready.pop_first() {
            order.push(n);
            for e in self.edges.iter().filter(|e| e.from == n) {
                in_degree[e.to] -= 1;
                if in_degree[e.to] == 0 {
                    ready.insert(e.to);
                }
            }
        }
        order
    }

    pub fn execution_order(&self) -> Vec<&str> {
        self.topological_order().into_iter().map(|i| self.entries[i].name.as_str()).collect()
    }

    pub fn output(&self, node: &str, socket: &str) -> Result<Option<Data>, ComputeError> {
        let idx = self.index_of(node)?;
        let sockets = self.entries[idx].node.outputs();
        let i = socket_index(sockets, socket)
            .ok_or_else(|| ComputeError::SocketNotFound { node: node.to_owned(), socket: socket.to_owned() })?;
        Ok(self.entries[idx].node.output(i))
    }

    /// Events of every later run are sent to the returned receiver.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GraphEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, run_id: Uuid, kind: GraphEventKind) {
        let event = GraphEvent { run_id, kind };
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    /// Gathers the inputs of `idx`, or `None` if any of them is unavailable.
    fn collect_inputs(&self, idx: usize) -> Option<Inputs> {
        let sockets = self.entries[idx].node.inputs();
        let mut values = Vec::with_capacity(sockets.len());
        for input in 0..sockets.len() {
            let edge = self.edges.iter().find(|e| e.to == idx && e.input == input)?;
            values.push(self.entries[edge.from].node.output(edge.output)?);
        }
        Some(Inputs::new(sockets, values))
    }

    /// Runs every enabled node whose inputs are available, in topological
    /// order, and stops at the first failure.
    pub async fn run(&mut self) -> Result<GraphRunReport, GraphRunFailureInfo> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut report = GraphRunReport { run_id, ..Default::default() };
        self.emit(run_id, GraphEventKind::RunStarted);
        tracing::debug!(%run_id, nodes = self.entries.len(), "graph run started");

        for idx in self.topological_order() {
            let name = self.entries[idx].name.clone();
            let inputs = match self.entries[idx].enabled {
                true => self.collect_inputs(idx),
                false => None,
            };
            let Some(inputs) = inputs else {
                tracing::debug!(%run_id, node = %name, "node skipped");
                report.skipped.push(name.clone());
                self.emit(run_id, GraphEventKind::NodeSkipped { node: name });
                continue;
            };

            self.emit(run_id, GraphEventKind::NodeStarted { node: name.clone() });
            let node_started = Instant::now();
            let result = self.entries[idx].node.run(inputs).await;
            let duration = node_started.elapsed();

            if let Err(error) = result {
                let info = NodeRunFailureInfo { node_name: name.clone(), message: error.to_string() };
                tracing::warn!(%run_id, node = %name, error = %error, "node failed, aborting graph run");
                self.emit(run_id, GraphEventKind::NodeFailed(info.clone()));
                self.emit(run_id, GraphEventKind::RunFailed(info));
                return Err(GraphRunFailureInfo { node_name: name, error });
            }
            tracing::debug!(%run_id, node = %name, ?duration, "node finished");
            self.emit(run_id, GraphEventKind::NodeFinished { node: name.clone(), duration });
            report.node_durations.push((name, duration));
        }

        report.total = started.elapsed();
        self.emit(run_id, GraphEventKind::RunFinished { duration: report.total });
        tracing::info!(%run_id, total = ?report.total, ran = report.node_durations.len(), skipped = report.skipped.len(), "graph run finished");
        Ok(report)
    }
}
