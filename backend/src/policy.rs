use regex::Regex;
use std::collections::BTreeMap;

use crate::models::{GuardDecision, Role};

/// Landing page for authenticated users, and the safe default for every bounced navigation.
pub const HOME_ROUTE: &str = "/home";
/// The login screen.
pub const LOGIN_ROUTE: &str = "/";

/// RoutePattern
///
/// A route such as `/projects/edit/:id` compiled to an anchored regular expression. Every
/// `:name` placeholder becomes a named group matching one or more ASCII letters, digits,
/// underscores or hyphens; the rest of the pattern is matched literally. Matching is exact, never a prefix.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pattern: String,
    regex: Regex,
}

impl RoutePattern {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::from("^");
        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                source.push('/');
            }
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    source.push_str(&format!(r"(?P<{name}>[A-Za-z0-9_-]+)"));
                }
                _ => source.push_str(&regex::escape(segment)),
            }
        }
        source.push('$');

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Named parameters of `path`, or `None` when it does not match.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// RouteEntry
///
/// One allow-listed destination and the view it renders.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub pattern: RoutePattern,
    pub view: String,
}

/// RouteTable
///
/// The allow-list of known routes plus the subset restricted to administrators.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
    restricted: Vec<RoutePattern>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allow-listed route rendering `view`.
    pub fn route(mut self, pattern: &str, view: &str) -> Result<Self, regex::Error> {
        self.routes.push(RouteEntry {
            pattern: RoutePattern::compile(pattern)?,
            view: view.to_string(),
        });
        Ok(self)
    }

    /// Marks `pattern` as reachable only by administrators.
    pub fn restrict(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.restricted.push(RoutePattern::compile(pattern)?);
        Ok(self)
    }

    /// dashboard
    ///
    /// The fixed table of the back office: every CRUD screen, with company data and user
    /// management reserved for administrators.
    pub fn dashboard() -> Self {
        Self::build_dashboard().expect("dashboard route patterns are valid")
    }

    fn build_dashboard() -> Result<Self, regex::Error> {
        RouteTable::new()
            .route("/home", "home")?
            .route("/generals", "generals")?
            .route("/users", "users")?
            .route("/products", "products")?
            .route("/projects", "projects")?
            .route("/projects/new", "new_project")?
            .route("/projects/edit/:id", "edit_project")?
            .route("/variables", "variables")?
            .route("/categories", "categories")?
            .route("/orders", "orders")?
            .restrict("/users")?
            .restrict("/generals")
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn is_restricted(&self, path: &str) -> bool {
        self.restricted.iter().any(|p| p.matches(path))
    }

    /// The first allow-listed entry matching `path`, with its parameters.
    pub fn lookup(&self, path: &str) -> Option<(&RouteEntry, BTreeMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|entry| entry.pattern.captures(path).map(|params| (entry, params)))
    }
}

/// AccessCheck
///
/// The individual checks of the guard. Each either lets the navigation through to the
/// next check or bounces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// Restricted route and the role is not admin: redirect home. Independent of login state.
    RestrictedRole,
    /// Route not in the allow-list: redirect home.
    KnownRoute,
    /// Not logged in: redirect to the login screen.
    Authenticated,
}

/// The precedence the dashboard ships with.
pub const STANDARD_ORDER: [AccessCheck; 3] = [
    AccessCheck::RestrictedRole,
    AccessCheck::KnownRoute,
    AccessCheck::Authenticated,
];

/// GuardInput
///
/// Everything the guard looks at for one navigation.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput<'a> {
    pub path: &'a str,
    pub authenticated: bool,
    pub role: Role,
}

/// RoutePolicy
///
/// The route access guard. `decide` is a pure function of its input: no counters, no
/// clocks, no store access.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    table: RouteTable,
    order: Vec<AccessCheck>,
    home: String,
    login: String,
}

impl RoutePolicy {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table,
            order: STANDARD_ORDER.to_vec(),
            home: HOME_ROUTE.to_string(),
            login: LOGIN_ROUTE.to_string(),
        }
    }

    /// The dashboard table evaluated in the standard order.
    pub fn standard() -> Self {
        Self::new(RouteTable::dashboard())
    }

    /// Replaces the precedence of the checks. Call sites of `decide` are unaffected.
    pub fn with_order(mut self, order: &[AccessCheck]) -> Self {
        self.order = order.to_vec();
        self
    }

    pub fn order(&self) -> &[AccessCheck] {
        &self.order
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// decide
    ///
    /// Runs the checks in order; the first one that objects decides the redirect. A
    /// navigation that passes every check renders the view it matched.
    pub fn decide(&self, input: &GuardInput<'_>) -> GuardDecision {
        let matched = self.table.lookup(input.path);

        for check in &self.order {
            let bounce = match check {
                AccessCheck::RestrictedRole => {
                    (self.table.is_restricted(input.path) && !input.role.is_admin())
                        .then_some(&self.home)
                }
                AccessCheck::KnownRoute => matched.is_none().then_some(&self.home),
                AccessCheck::Authenticated => (!input.authenticated).then_some(&self.login),
            };
            if let Some(to) = bounce {
                return GuardDecision::Redirect { to: to.clone() };
            }
        }

        match matched {
            Some((entry, params)) => GuardDecision::Render {
                view: entry.view.clone(),
                params,
            },
            // Only reachable when KnownRoute was left out of the order.
            None => GuardDecision::Redirect {
                to: self.home.clone(),
            },
        }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// navigation_visible
///
/// The sidebar is hidden on the login screen and shown everywhere else.
pub fn navigation_visible(path: &str) -> bool {
    path != LOGIN_ROUTE
}
