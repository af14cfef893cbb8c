use jobclock_core::MATCH_ALL;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{FetchError, FetchResult, Page, PageRequest};

pub const INSTANCE_FIELD: &str = "job.job_info.execute_node";
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Build the search body for one page of completed jobs, oldest first.
pub fn page_query(req: &PageRequest<'_>) -> Value {
    let mut must = vec![
        json!({"wildcard": {"type": req.job_type}}),
        json!({"match": {"status": req.status}}),
    ];
    // documents without the instance field still match "*"
    if req.instance != MATCH_ALL {
        must.push(json!({"wildcard": {INSTANCE_FIELD: req.instance}}));
    }
    if let Some(after) = req.after {
        must.push(json!({"range": {TIMESTAMP_FIELD: {"gt": after}}}));
    }
    search_body(must, req.offset, req.size)
}

/// Build the search body for the live queue: every type with the given status.
pub fn queue_query(status: &str, limit: usize) -> Value {
    let must = vec![
        json!({"wildcard": {"type": MATCH_ALL}}),
        json!({"match": {"status": status}}),
    ];
    search_body(must, 0, limit)
}

fn search_body(must: Vec<Value>, from: usize, size: usize) -> Value {
    json!({
        "query": {"bool": {"must": must, "must_not": [], "should": []}},
        "from": from,
        "size": size,
        "sort": [{TIMESTAMP_FIELD: {"order": "asc"}}],
        "track_total_hits": true,
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: Total,
    #[serde(default)]
    hits: Vec<Value>,
}

/// Older servers report a bare count, newer ones `{"value": n, "relation": "eq"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

pub fn parse_search_response(body: &str) -> FetchResult<Page> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Protocol(format!("decode search response: {e}")))?;
    let total = match resp.hits.total {
        Total::Count(n) => n,
        Total::Object { value } => value,
    };
    Ok(Page {
        hits: resp.hits.hits,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(instance: &'a str, after: Option<&'a str>) -> PageRequest<'a> {
        PageRequest {
            job_type: "job-*",
            instance,
            status: "job-completed",
            after,
            offset: 2000,
            size: 1000,
        }
    }

    #[test]
    fn page_query_has_bound_and_paging() {
        let q = page_query(&req("c5*", Some("2023-01-01T00:00:00")));
        let must = q["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 4);
        assert_eq!(must[0]["wildcard"]["type"], "job-*");
        assert_eq!(must[2]["wildcard"][INSTANCE_FIELD], "c5*");
        assert_eq!(must[3]["range"][TIMESTAMP_FIELD]["gt"], "2023-01-01T00:00:00");
        assert_eq!(q["from"], 2000);
        assert_eq!(q["size"], 1000);
        assert_eq!(q["sort"][0][TIMESTAMP_FIELD]["order"], "asc");
    }

    #[test]
    fn star_instance_and_no_bound_are_omitted() {
        let q = page_query(&req("*", None));
        assert_eq!(q["query"]["bool"]["must"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn queue_query_starts_at_zero() {
        let q = queue_query("job-queued", 4000);
        assert_eq!(q["from"], 0);
        assert_eq!(q["size"], 4000);
        assert_eq!(q["query"]["bool"]["must"][1]["match"]["status"], "job-queued");
    }

    #[test]
    fn parses_both_total_shapes() {
        let old = parse_search_response(r#"{"hits": {"total": 7, "hits": [{"_source": {}}]}}"#).unwrap();
        assert_eq!(old.total, 7);
        assert_eq!(old.hits.len(), 1);
        let new = parse_search_response(r#"{"took": 3, "hits": {"total": {"value": 12, "relation": "eq"}, "hits": []}}"#).unwrap();
        assert_eq!(new.total, 12);
        assert!(new.hits.is_empty());
    }

    #[test]
    fn malformed_responses_are_protocol_errors() {
        for body in ["<html>", r#"{"error": "boom"}"#, r#"{"hits": {"hits": []}}"#] {
            assert!(matches!(parse_search_response(body), Err(FetchError::Protocol(_))), "{body}");
        }
    }
}
