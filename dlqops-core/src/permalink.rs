//! Search-UI permalinks for a single field/value phrase filter.

use crate::config::EnvironmentConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchLinkBuilder {
    host: String,
    index_id: String,
    view_id: String,
}

impl SearchLinkBuilder {
    pub fn new(
        host: impl Into<String>,
        index_id: impl Into<String>,
        view_id: impl Into<String>,
    ) -> Self {
        let mut host = host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        Self {
            host,
            index_id: index_id.into(),
            view_id: view_id.into(),
        }
    }

    pub fn from_environment(env: &EnvironmentConfig) -> Self {
        Self::new(
            env.opensearch_host.clone(),
            env.index_id.clone(),
            env.default_view_id.clone(),
        )
    }

    /// Discover link filtered on `key: value` over the last 15 minutes. Missing
    /// values give an empty link.
    pub fn link(&self, key: &str, value: Option<&str>) -> String {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return String::new();
        };
        let value = rison_escape(value);
        let index = &self.index_id;

        format!(
            "{host}_dashboards/app/discover#/view/{view}?_g=(filters:!(),refreshInterval:(pause:!t,value:0),time:(from:now-15m,to:now))\
             &_a=(columns:!(_source),filters:!(('$state':(store:appState),meta:(alias:!n,disabled:!f,index:'{index}',key:{key},negate:!f,params:(query:'{value}'),type:phrase),\
             query:(match_phrase:({key}:'{value}')))),index:'{index}',interval:auto,query:(language:kuery,query:''),sort:!())",
            host = self.host,
            view = self.view_id,
        )
    }

    pub fn by_event_id(&self, event_id: Option<&str>) -> String {
        self.link("eventId", event_id)
    }

    pub fn by_trace_id(&self, trace_id: Option<&str>) -> String {
        self.link("traceId", trace_id)
    }
}

fn rison_escape(value: &str) -> String {
    value.replace('!', "!!").replace('\'', "!'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SearchLinkBuilder {
        SearchLinkBuilder::new("https://logs.example.com", "idx-1", "view-9")
    }

    #[test]
    fn test_link_embeds_view_index_and_phrase() {
        let link = builder().by_event_id(Some("e-42"));

        assert!(link.starts_with(
            "https://logs.example.com/_dashboards/app/discover#/view/view-9?_g="
        ));
        assert!(link.contains("index:'idx-1',key:eventId"));
        assert!(link.contains("query:(match_phrase:(eventId:'e-42'))"));
        assert!(link.ends_with("sort:!())"));
    }

    #[test]
    fn test_link_is_empty_without_value() {
        assert_eq!(builder().by_trace_id(None), "");
        assert_eq!(builder().by_trace_id(Some("")), "");
    }

    #[test]
    fn test_link_escapes_quotes() {
        let link = builder().by_trace_id(Some("it's"));
        assert!(link.contains("traceId:'it!'s'"));
    }
}
