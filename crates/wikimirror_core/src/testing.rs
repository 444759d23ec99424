use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value, json};

use crate::client::{ApiTransport, Params};
use crate::error::{MirrorError, Result};

/// In-memory MediaWiki that speaks just enough of `api.php` for the
/// mirror pipeline: login tokens, login, siteinfo namespaces, allpages with
/// continuation, and single-title revision lookups.
#[derive(Debug)]
pub(crate) struct FakeWiki {
    pub login_token: Option<String>,
    pub login_result: String,
    pub login_reason: Option<String>,
    pub require_login: bool,
    pub namespaces: Vec<(i32, String)>,
    pub pages: Vec<(String, i32)>,
    pub contents: HashMap<String, Option<String>>,
    pub failing_titles: HashSet<String>,
    pub batch_size: usize,
    pub pages_as_object: bool,
    /// Drop the login after this many allpages responses.
    pub expire_session_after: Option<usize>,
    /// Drop the login after this many revisions responses.
    pub expire_session_after_fetches: Option<usize>,
    pub logged_in: Cell<bool>,
    pub issued_tokens: RefCell<HashMap<String, usize>>,
    pub requests: RefCell<Vec<Request>>,
}

#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub method: &'static str,
    pub params: BTreeMap<String, String>,
}

impl Request {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl Default for FakeWiki {
    fn default() -> Self {
        Self {
            login_token: Some("d41d8cd98f00b204e9800998ecf8427e+\\".to_string()),
            login_result: "Success".to_string(),
            login_reason: None,
            require_login: true,
            namespaces: vec![
                (-2, "Media".to_string()),
                (-1, "Special".to_string()),
                (0, String::new()),
                (4, "Project".to_string()),
                (10, "Template".to_string()),
                (12, "Help".to_string()),
            ],
            pages: Vec::new(),
            contents: HashMap::new(),
            failing_titles: HashSet::new(),
            batch_size: 500,
            pages_as_object: false,
            expire_session_after: None,
            expire_session_after_fetches: None,
            logged_in: Cell::new(false),
            issued_tokens: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl FakeWiki {
    pub fn with_page(mut self, title: &str, namespace: i32, body: Option<&str>) -> Self {
        self.pages.push((title.to_string(), namespace));
        self.contents
            .insert(title.to_string(), body.map(ToString::to_string));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn requests_where(&self, key: &str, value: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|request| request.get(key) == Some(value))
            .collect()
    }

    fn record(&self, method: &'static str, params: &Params<'_>) -> Request {
        let request = Request {
            method,
            params: params
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
        };
        self.requests.borrow_mut().push(request.clone());
        request
    }

    fn ensure_logged_in(&self) -> Result<()> {
        if self.require_login && !self.logged_in.get() {
            return Err(MirrorError::Api {
                code: "readapidenied".to_string(),
                info: "You need read permission to use this module.".to_string(),
            });
        }
        Ok(())
    }

    fn tokens(&self) -> Value {
        match &self.login_token {
            Some(token) => json!({"batchcomplete": true, "query": {"tokens": {"logintoken": token}}}),
            None => json!({"batchcomplete": true, "query": {"tokens": {}}}),
        }
    }

    fn siteinfo(&self) -> Value {
        let mut namespaces = Map::new();
        for (id, name) in &self.namespaces {
            namespaces.insert(
                id.to_string(),
                json!({"id": id, "case": "first-letter", "name": name}),
            );
        }
        json!({"batchcomplete": true, "query": {"namespaces": namespaces}})
    }

    fn allpages(&self, request: &Request) -> Result<Value> {
        if let Some(limit) = self.expire_session_after
            && self.requests_where("list", "allpages").len() > limit
        {
            self.logged_in.set(false);
        }
        self.ensure_logged_in()?;
        let namespace = request
            .get("apnamespace")
            .map(|value| value.parse::<i32>().expect("numeric apnamespace"));
        let matching: Vec<&(String, i32)> = self
            .pages
            .iter()
            .filter(|(_, ns)| namespace.is_none_or(|wanted| *ns == wanted))
            .collect();

        let start = match request.get("apcontinue") {
            None => 0,
            Some(token) => match self.issued_tokens.borrow().get(token) {
                Some(index) => *index,
                None => {
                    return Err(MirrorError::Api {
                        code: "badcontinue".to_string(),
                        info: format!("Invalid continue param: {token}"),
                    });
                }
            },
        };
        let end = (start + self.batch_size.max(1)).min(matching.len());
        let batch: Vec<Value> = matching[start..end]
            .iter()
            .enumerate()
            .map(|(offset, (title, ns))| {
                json!({"pageid": start + offset + 1, "ns": ns, "title": title})
            })
            .collect();

        let mut response = json!({"batchcomplete": true, "query": {"allpages": batch}});
        if end < matching.len() {
            // Deliberately awkward so that any re-encoding is caught.
            let token = format!("{} |~{end}&x=1", matching[end].0);
            self.issued_tokens.borrow_mut().insert(token.clone(), end);
            response["continue"] = json!({"apcontinue": token, "continue": "-||"});
        }
        Ok(response)
    }

    fn revisions(&self, request: &Request) -> Result<Value> {
        if let Some(limit) = self.expire_session_after_fetches
            && self.requests_where("prop", "revisions").len() > limit
        {
            self.logged_in.set(false);
        }
        self.ensure_logged_in()?;
        let title = request.get("titles").expect("titles param").to_string();
        if self.failing_titles.contains(&title) {
            return Err(MirrorError::transport(format!("connection reset while fetching {title}")));
        }
        let namespace = self
            .pages
            .iter()
            .find(|(candidate, _)| *candidate == title)
            .map(|(_, ns)| *ns)
            .unwrap_or(0);
        let page_id = self
            .pages
            .iter()
            .position(|(candidate, _)| *candidate == title)
            .map(|index| index + 100);

        let entry = match (page_id, self.contents.get(&title)) {
            (Some(page_id), Some(Some(body))) => {
                // formatversion=1 puts slot content under "*".
                let content_key = if self.pages_as_object { "*" } else { "content" };
                let mut main = json!({"contentmodel": "wikitext", "contentformat": "text/x-wiki"});
                main[content_key] = json!(body);
                json!({
                    "pageid": page_id,
                    "ns": namespace,
                    "title": title,
                    "revisions": [{"slots": {"main": main}}]
                })
            }
            (Some(page_id), _) => json!({"pageid": page_id, "ns": namespace, "title": title}),
            (None, _) => json!({"ns": namespace, "title": title, "missing": true}),
        };

        if self.pages_as_object {
            let key = entry
                .get("pageid")
                .map(ToString::to_string)
                .unwrap_or_else(|| "-1".to_string());
            let mut pages = Map::new();
            pages.insert(key, entry);
            return Ok(json!({"batchcomplete": "", "query": {"pages": pages}}));
        }
        Ok(json!({"batchcomplete": true, "query": {"pages": [entry]}}))
    }

    fn login(&self, request: &Request) -> Value {
        let token_ok = self.login_token.is_some() && request.get("lgtoken") == self.login_token.as_deref();
        if token_ok && self.login_result == "Success" {
            self.logged_in.set(true);
            return json!({"login": {"result": "Success", "lguserid": 7, "lgusername": request.get("lgname")}});
        }
        let result = if token_ok {
            self.login_result.as_str()
        } else {
            "WrongToken"
        };
        let mut login = json!({ "result": result });
        if let Some(reason) = &self.login_reason {
            login["reason"] = json!(reason);
        }
        json!({"login": login})
    }
}

impl ApiTransport for FakeWiki {
    fn get(&self, params: &Params<'_>) -> Result<Value> {
        let request = self.record("GET", params);
        match (request.get("meta"), request.get("list"), request.get("prop")) {
            (Some("tokens"), _, _) => Ok(self.tokens()),
            (Some("siteinfo"), _, _) => Ok(self.siteinfo()),
            (_, Some("allpages"), _) => self.allpages(&request),
            (_, _, Some("revisions")) => self.revisions(&request),
            _ => Err(MirrorError::Api {
                code: "badparams".to_string(),
                info: format!("unexpected request {:?}", request.params),
            }),
        }
    }

    fn post(&self, params: &Params<'_>) -> Result<Value> {
        let request = self.record("POST", params);
        match request.get("action") {
            Some("login") => Ok(self.login(&request)),
            _ => Err(MirrorError::Api {
                code: "badparams".to_string(),
                info: "unexpected POST".to_string(),
            }),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

/// `count` main-namespace pages named `Page 0001` .. with body `body of <title>`.
pub(crate) fn numbered_wiki(count: usize, batch_size: usize) -> FakeWiki {
    let mut wiki = FakeWiki {
        batch_size,
        ..FakeWiki::default()
    };
    for index in 1..=count {
        let title = format!("Page {index:04}");
        let body = format!("body of {title}");
        wiki = wiki.with_page(&title, 0, Some(&body));
    }
    wiki
}
