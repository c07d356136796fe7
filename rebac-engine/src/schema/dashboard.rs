/// Built-in schema for the dashboard permission service.
///
/// Every action on `namespace`, `folder2` and `dashboard` accepts direct grants
/// to users, team members and role assignees. Stronger actions imply weaker
/// ones (`admin` > `edit` > `view` > `read`), and folders and dashboards inherit
/// each action from their parent folder.
pub const DASHBOARD_SCHEMA: &str = r#"
model
  schema 1.1

type user

type team
  relations
    define admin: [user]
    define member: [user] or admin

type role
  relations
    define assignee: [user, team#member, role#assignee]

type namespace
  relations
    define admin: [user, team#member, role#assignee]
    define edit: [user, team#member, role#assignee] or admin
    define view: [user, team#member, role#assignee] or edit
    define read: [user, team#member, role#assignee] or view
    define create: [user, team#member, role#assignee] or edit
    define write: [user, team#member, role#assignee] or edit
    define delete: [user, team#member, role#assignee] or edit
    define permissions_read: [user, team#member, role#assignee] or admin
    define permissions_write: [user, team#member, role#assignee] or admin

type folder2
  relations
    define parent: [folder2]
    define admin: [user, team#member, role#assignee] or admin from parent
    define edit: [user, team#member, role#assignee] or admin or edit from parent
    define view: [user, team#member, role#assignee] or edit or view from parent
    define read: [user, team#member, role#assignee] or view or read from parent
    define create: [user, team#member, role#assignee] or edit or create from parent
    define write: [user, team#member, role#assignee] or edit or write from parent
    define delete: [user, team#member, role#assignee] or edit or delete from parent
    define permissions_read: [user, team#member, role#assignee] or admin or permissions_read from parent
    define permissions_write: [user, team#member, role#assignee] or admin or permissions_write from parent

type dashboard
  relations
    define folder: [folder2]
    define admin: [user, team#member, role#assignee] or admin from folder
    define edit: [user, team#member, role#assignee] or admin or edit from folder
    define view: [user, team#member, role#assignee] or edit or view from folder
    define permissions_read: [user, team#member, role#assignee] or admin or permissions_read from folder
    define permissions_write: [user, team#member, role#assignee] or admin or permissions_write from folder

# Grants on resources apply only when the caller's group matches the group
# stored on the grant.
type resource
  relations
    define admin: [user with group_filter, team#member with group_filter, role#assignee with group_filter]
    define edit: [user with group_filter, team#member with group_filter, role#assignee with group_filter] or admin
    define view: [user with group_filter, team#member with group_filter, role#assignee with group_filter] or edit

condition group_filter(requested_group: string, resource_group: string) {
  requested_group == resource_group
}
"#;
