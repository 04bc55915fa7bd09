//! Query execution into a result graph

use futures::TryStreamExt;
use tql_core::result::{PathElement, ResultGraph};
use tql_core::{Cell, Node, QueryEngine, Relationship, Result, TqlError};
use tracing::debug;

/// Run `query` in a read transaction and collect every graph cell
///
/// The transaction is dropped when this returns, on success or failure.
pub async fn execute(engine: &dyn QueryEngine, query: &str) -> Result<ResultGraph> {
    let mut tx = engine.begin_read().await.map_err(execution_failure)?;
    let mut rows = tx.execute(query).await.map_err(execution_failure)?;

    let mut graph = ResultGraph::new();
    let mut row_count = 0usize;
    while let Some(row) = rows.try_next().await.map_err(execution_failure)? {
        for cell in row.cells() {
            add_cell(&mut graph, cell);
        }
        row_count += 1;
    }

    debug!(
        engine = engine.name(),
        rows = row_count,
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "Materialized result graph"
    );
    Ok(graph)
}

fn execution_failure(err: TqlError) -> TqlError {
    match err {
        TqlError::QueryExecutionFailed(_) => err,
        other => TqlError::QueryExecutionFailed(other.to_string()),
    }
}

/// Merge one cell into the graph; scalars carry no graph structure
pub fn add_cell(graph: &mut ResultGraph, cell: &Cell) {
    match cell {
        Cell::Node(node) => add_node(graph, node),
        Cell::Relationship(rel) => add_relationship(graph, rel),
        Cell::Path(path) => {
            let mut elements = Vec::with_capacity(path.nodes.len() + path.relationships.len());
            for (i, node) in path.nodes.iter().enumerate() {
                add_node(graph, node);
                elements.push(PathElement::Vertex(node.id));
                if let Some(rel) = path.relationships.get(i) {
                    add_relationship(graph, rel);
                    elements.push(PathElement::Edge(rel.id));
                }
            }
            graph.push_path(elements);
        }
        Cell::List(items) => {
            for item in items {
                add_cell(graph, item);
            }
        }
        Cell::Scalar(_) => {}
    }
}

fn add_node(graph: &mut ResultGraph, node: &Node) {
    graph.upsert_vertex(node.id, node.labels.iter().cloned(), &node.properties);
}

fn add_relationship(graph: &mut ResultGraph, rel: &Relationship) {
    add_node(graph, &rel.start);
    add_node(graph, &rel.end);
    graph.upsert_edge(
        rel.id,
        &rel.rel_type,
        rel.start.id,
        rel.end.id,
        &rel.properties,
    );
}
