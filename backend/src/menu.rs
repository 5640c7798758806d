use crate::models::{MenuItem, MenuSection, Role};

struct Entry {
    label: &'static str,
    route: &'static str,
    admin_only: bool,
}

struct Section {
    label: &'static str,
    entries: &'static [Entry],
}

// Sidebar layout, in display order.
const SECTIONS: &[Section] = &[
    Section {
        label: "General Settings",
        entries: &[
            Entry { label: "Company Data", route: "/generals", admin_only: true },
            Entry { label: "Users", route: "/users", admin_only: true },
            Entry { label: "Project Blog", route: "/projects", admin_only: false },
        ],
    },
    Section {
        label: "E-Commerce",
        entries: &[
            Entry { label: "Products", route: "/products", admin_only: false },
            Entry { label: "Variables", route: "/variables", admin_only: false },
            Entry { label: "Categories", route: "/categories", admin_only: false },
            Entry { label: "Orders", route: "/orders", admin_only: false },
        ],
    },
];

/// visible_menu
///
/// Sidebar sections visible to `role`, order preserved. Admin-only entries are dropped for
/// everyone else, and so is any section left without entries.
pub fn visible_menu(role: Role) -> Vec<MenuSection> {
    SECTIONS
        .iter()
        .filter_map(|section| {
            let items: Vec<MenuItem> = section
                .entries
                .iter()
                .filter(|entry| !entry.admin_only || role.is_admin())
                .map(|entry| MenuItem {
                    label: entry.label.to_string(),
                    route: entry.route.to_string(),
                })
                .collect();
            (!items.is_empty()).then(|| MenuSection {
                label: section.label.to_string(),
                items,
            })
        })
        .collect()
}

/// home_tiles
///
/// Shortcut tiles of the home screen: the visible menu entries, flattened.
pub fn home_tiles(role: Role) -> Vec<MenuItem> {
    visible_menu(role)
        .into_iter()
        .flat_map(|section| section.items)
        .collect()
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::Admin => "Administrator",
        Role::Default => "User",
    }
}
