/// Builder for KDL policy documents
#[derive(Default)]
pub struct PolicyBuilder {
    users: Vec<String>,
    role_mappings: Vec<String>,
    bindings: Vec<String>,
    roles: Vec<String>,
}

fn dash_list(name: &str, values: &[&str]) -> String {
    let items: String = values
        .iter()
        .map(|v| format!("            - \"{v}\"\n"))
        .collect();
    format!("        {name} {{\n{items}        }}\n")
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, principal: &str, username: &str, groups: &[&str]) -> Self {
        self.users.push(format!(
            "    user \"{principal}\" username=\"{username}\" {{\n{}    }}\n",
            dash_list("groups", groups)
        ));
        self
    }

    pub fn role_mapping(mut self, pattern: &str, username: &str, groups: &[&str]) -> Self {
        self.role_mappings.push(format!(
            "    role \"{pattern}\" username=\"{username}\" {{\n{}    }}\n",
            dash_list("groups", groups)
        ));
        self
    }

    pub fn bind_group(mut self, group: &str, role: &str) -> Self {
        self.bindings
            .push(format!("binding \"Group\" \"{group}\" role=\"{role}\"\n"));
        self
    }

    pub fn bind_user(mut self, user: &str, role: &str) -> Self {
        self.bindings
            .push(format!("binding \"User\" \"{user}\" role=\"{role}\"\n"));
        self
    }

    pub fn role(mut self, role: RoleBuilder) -> Self {
        self.roles.push(role.build());
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        if !self.users.is_empty() || !self.role_mappings.is_empty() {
            out.push_str("identity {\n");
            for entry in self.users.iter().chain(self.role_mappings.iter()) {
                out.push_str(entry);
            }
            out.push_str("}\n");
        }
        for binding in &self.bindings {
            out.push_str(binding);
        }
        for role in &self.roles {
            out.push_str(role);
        }
        out
    }
}

/// Builder for a single `role` node
pub struct RoleBuilder {
    name: String,
    rules: Vec<String>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> Self {
        self.rules.push(format!(
            "    rule {{\n{}{}{}    }}\n",
            dash_list("api-groups", api_groups),
            dash_list("resources", resources),
            dash_list("verbs", verbs)
        ));
        self
    }

    fn build(self) -> String {
        format!("role \"{}\" {{\n{}}}\n", self.name, self.rules.concat())
    }
}
